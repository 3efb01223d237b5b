// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The wire grammar: encodes and decodes requests and responses.
//!
//! Grounded on `backend/get1.c` in full — each `get*` routine there prompts
//! for, and parses, exactly the arguments one request needs before handing
//! them to its `do*` counterpart. [`Request`] mirrors that one-variant-per-
//! operation shape; [`Request::decode_from`]/[`Request::encode_into`]
//! replace `get1.c`'s interactive prompting with a length-prefixed binary
//! grammar, in the style of the teacher's `key.rs`/`value.rs` encoders.

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::item::{LinkEnd, Span, Specset, Vspec};
use crate::tumbler::Tumbler;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

impl Encode for Tumbler {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u8(u8::from(self.is_negative()))?;
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u8(self.len() as u8)?;
        for i in 0..self.len() {
            writer.write_i64::<BigEndian>(self.digit(i))?;
        }
        Ok(())
    }
}

impl Decode for Tumbler {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let negative = reader.read_u8()? != 0;
        let n = reader.read_u8()?;
        let mut digits = Vec::with_capacity(n.into());
        for _ in 0..n {
            digits.push(reader.read_i64::<BigEndian>()?);
        }
        Ok(Self::from_digits(negative, digits))
    }
}

impl Encode for Span {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        self.stream.encode_into(writer)?;
        self.width.encode_into(writer)
    }
}

impl Decode for Span {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let stream = Tumbler::decode_from(reader)?;
        let width = Tumbler::decode_from(reader)?;
        Ok(Self::new(stream, width))
    }
}

fn encode_vec<W: Write, T: Encode>(writer: &mut W, items: &[T]) -> Result<(), EncodeError> {
    #[allow(clippy::cast_possible_truncation)]
    writer.write_u16::<BigEndian>(items.len() as u16)?;
    for item in items {
        item.encode_into(writer)?;
    }
    Ok(())
}

fn decode_vec<R: Read, T: Decode>(reader: &mut R) -> Result<Vec<T>, DecodeError> {
    let n = reader.read_u16::<BigEndian>()?;
    (0..n).map(|_| T::decode_from(reader)).collect()
}

impl Encode for Vspec {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        self.docisa.encode_into(writer)?;
        encode_vec(writer, &self.vspans)
    }
}

impl Decode for Vspec {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let docisa = Tumbler::decode_from(reader)?;
        let vspans = decode_vec(reader)?;
        Ok(Self::new(docisa, vspans))
    }
}

fn encode_specset<W: Write>(writer: &mut W, specset: &Specset) -> Result<(), EncodeError> {
    encode_vec(writer, specset)
}

fn decode_specset<R: Read>(reader: &mut R) -> Result<Specset, DecodeError> {
    decode_vec(reader)
}

impl Encode for LinkEnd {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u8(match self {
            Self::From => 1,
            Self::To => 2,
            Self::Three => 3,
        })?;
        Ok(())
    }
}

impl Decode for LinkEnd {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        match reader.read_u8()? {
            1 => Ok(Self::From),
            2 => Ok(Self::To),
            3 => Ok(Self::Three),
            other => Err(DecodeError::InvalidTag(other)),
        }
    }
}

/// A `(source vspan, destination start)` pair, as named by `REARRANGE`'s
/// `cutseq`.
fn encode_cutseq<W: Write>(writer: &mut W, cutseq: &[(Span, Tumbler)]) -> Result<(), EncodeError> {
    #[allow(clippy::cast_possible_truncation)]
    writer.write_u16::<BigEndian>(cutseq.len() as u16)?;
    for (span, dst) in cutseq {
        span.encode_into(writer)?;
        dst.encode_into(writer)?;
    }
    Ok(())
}

fn decode_cutseq<R: Read>(reader: &mut R) -> Result<Vec<(Span, Tumbler)>, DecodeError> {
    let n = reader.read_u16::<BigEndian>()?;
    (0..n)
        .map(|_| {
            let span = Span::decode_from(reader)?;
            let dst = Tumbler::decode_from(reader)?;
            Ok((span, dst))
        })
        .collect()
}

/// One request-code's worth of arguments, as `get1.c` would have parsed
/// them off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `getfinddocscontaining`.
    FindDocsContaining {
        /// The specset to search for.
        specset: Specset,
    },
    /// `getcopy`.
    Copy {
        /// The document being copied from.
        doc: Tumbler,
        /// The version-space address to copy from.
        vsa: Tumbler,
        /// The specset identifying the destination.
        specset: Specset,
    },
    /// `getinsert`.
    Insert {
        /// The document being inserted into.
        doc: Tumbler,
        /// The version-space address to insert at.
        vsa: Tumbler,
        /// The bytes to insert.
        text: Vec<u8>,
    },
    /// `getcreatelink`.
    CreateLink {
        /// The document the link is created in.
        doc: Tumbler,
        /// The link's "from" endpoint.
        from: Specset,
        /// The link's "to" endpoint.
        to: Specset,
        /// The link's "three" (type) endpoint.
        three: Specset,
    },
    /// `getfollowlink`.
    FollowLink {
        /// The link to follow.
        link: Tumbler,
        /// Which end of the link to retrieve.
        which: LinkEnd,
    },
    /// `getcreatenewversion`.
    CreateNewVersion {
        /// The document to create a new version of.
        doc: Tumbler,
    },
    /// `getcreatenewdocument`.
    CreateNewDocument {
        /// The account to create the new document under.
        account: Tumbler,
    },
    /// `getretrievedocvspanset`.
    RetrieveDocVspanSet {
        /// The document whose vspan set is retrieved.
        doc: Tumbler,
    },
    /// `getretrievedocvspan`.
    RetrieveDocVspan {
        /// The document whose vspan is retrieved.
        doc: Tumbler,
    },
    /// `getrearrange`.
    Rearrange {
        /// The document being rearranged.
        doc: Tumbler,
        /// The cut sequence: spans paired with their new destinations.
        cutseq: Vec<(Span, Tumbler)>,
    },
    /// `getdeletevspan`.
    DeleteVspan {
        /// The document being edited.
        doc: Tumbler,
        /// The vspan to delete.
        vspan: Span,
    },
    /// `getretrievev`.
    RetrieveV {
        /// The specset to retrieve.
        specset: Specset,
    },
    /// `getretrieveendsets`.
    RetrieveEndSets {
        /// The link whose end sets are retrieved.
        link: Tumbler,
    },
    /// `getfindlinksfromtothree`.
    FindLinksFromToThree {
        /// Wildcard when `None`.
        from: Option<Specset>,
        /// Wildcard when `None`.
        to: Option<Specset>,
        /// Wildcard when `None`.
        three: Option<Specset>,
    },
    /// `getfindnumoflinksfromtothree`.
    FindNumOfLinksFromToThree {
        /// Wildcard when `None`.
        from: Option<Specset>,
        /// Wildcard when `None`.
        to: Option<Specset>,
        /// Wildcard when `None`.
        three: Option<Specset>,
    },
    /// `getshowrelationof2versions`.
    ShowRelationOf2Versions {
        /// The first version to compare.
        version1: Specset,
        /// The second version to compare.
        version2: Specset,
    },
    /// `getcreatenode_or_account`.
    CreateNodeOrAccount {
        /// The type (`isa`) of node or account to create.
        isa: Tumbler,
    },
    /// `getxaccount`.
    XAccount {
        /// The account being operated on.
        account: Tumbler,
    },
    /// `getopen`.
    Open {
        /// The document to open.
        doc: Tumbler,
        /// The requested access level.
        access: u8,
        /// The requested open mode.
        mode: u8,
    },
    /// `getclose`.
    Close {
        /// The document to close.
        doc: Tumbler,
    },
    /// `getfindnextnlinksfromtothree`: paginated continuation of
    /// `FindLinksFromToThree`.
    FindNextNLinksFromToThree {
        /// Wildcard when `None`.
        from: Option<Specset>,
        /// Wildcard when `None`.
        to: Option<Specset>,
        /// Wildcard when `None`.
        three: Option<Specset>,
        /// The last link isa already returned to the caller, or `None` to
        /// start from the beginning.
        after: Option<Tumbler>,
        /// Maximum number of further matches to return.
        n: u32,
    },
    /// A request for the current engine snapshot.
    DumpState,
    /// Ends the connection.
    Quit,
}

fn encode_optional_specset<W: Write>(writer: &mut W, specset: &Option<Specset>) -> Result<(), EncodeError> {
    match specset {
        Some(s) => {
            writer.write_u8(1)?;
            encode_specset(writer, s)
        }
        None => writer.write_u8(0).map_err(Into::into),
    }
}

fn decode_optional_specset<R: Read>(reader: &mut R) -> Result<Option<Specset>, DecodeError> {
    match reader.read_u8()? {
        0 => Ok(None),
        _ => Ok(Some(decode_specset(reader)?)),
    }
}

fn encode_optional_tumbler<W: Write>(writer: &mut W, tumbler: &Option<Tumbler>) -> Result<(), EncodeError> {
    match tumbler {
        Some(t) => {
            writer.write_u8(1)?;
            t.encode_into(writer)
        }
        None => writer.write_u8(0).map_err(Into::into),
    }
}

fn decode_optional_tumbler<R: Read>(reader: &mut R) -> Result<Option<Tumbler>, DecodeError> {
    match reader.read_u8()? {
        0 => Ok(None),
        _ => Ok(Some(Tumbler::decode_from(reader)?)),
    }
}

impl Encode for Request {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        match self {
            Self::FindDocsContaining { specset } => {
                writer.write_u8(1)?;
                encode_specset(writer, specset)
            }
            Self::Copy { doc, vsa, specset } => {
                writer.write_u8(2)?;
                doc.encode_into(writer)?;
                vsa.encode_into(writer)?;
                encode_specset(writer, specset)
            }
            Self::Insert { doc, vsa, text } => {
                writer.write_u8(3)?;
                doc.encode_into(writer)?;
                vsa.encode_into(writer)?;
                #[allow(clippy::cast_possible_truncation)]
                writer.write_u32::<BigEndian>(text.len() as u32)?;
                writer.write_all(text)?;
                Ok(())
            }
            Self::CreateLink { doc, from, to, three } => {
                writer.write_u8(4)?;
                doc.encode_into(writer)?;
                encode_specset(writer, from)?;
                encode_specset(writer, to)?;
                encode_specset(writer, three)
            }
            Self::FollowLink { link, which } => {
                writer.write_u8(5)?;
                link.encode_into(writer)?;
                which.encode_into(writer)
            }
            Self::CreateNewVersion { doc } => {
                writer.write_u8(6)?;
                doc.encode_into(writer)
            }
            Self::CreateNewDocument { account } => {
                writer.write_u8(7)?;
                account.encode_into(writer)
            }
            Self::RetrieveDocVspanSet { doc } => {
                writer.write_u8(8)?;
                doc.encode_into(writer)
            }
            Self::RetrieveDocVspan { doc } => {
                writer.write_u8(9)?;
                doc.encode_into(writer)
            }
            Self::Rearrange { doc, cutseq } => {
                writer.write_u8(10)?;
                doc.encode_into(writer)?;
                encode_cutseq(writer, cutseq)
            }
            Self::DeleteVspan { doc, vspan } => {
                writer.write_u8(11)?;
                doc.encode_into(writer)?;
                vspan.encode_into(writer)
            }
            Self::RetrieveV { specset } => {
                writer.write_u8(12)?;
                encode_specset(writer, specset)
            }
            Self::RetrieveEndSets { link } => {
                writer.write_u8(13)?;
                link.encode_into(writer)
            }
            Self::FindLinksFromToThree { from, to, three } => {
                writer.write_u8(14)?;
                encode_optional_specset(writer, from)?;
                encode_optional_specset(writer, to)?;
                encode_optional_specset(writer, three)
            }
            Self::FindNumOfLinksFromToThree { from, to, three } => {
                writer.write_u8(15)?;
                encode_optional_specset(writer, from)?;
                encode_optional_specset(writer, to)?;
                encode_optional_specset(writer, three)
            }
            Self::ShowRelationOf2Versions { version1, version2 } => {
                writer.write_u8(16)?;
                encode_specset(writer, version1)?;
                encode_specset(writer, version2)
            }
            Self::CreateNodeOrAccount { isa } => {
                writer.write_u8(17)?;
                isa.encode_into(writer)
            }
            Self::XAccount { account } => {
                writer.write_u8(18)?;
                account.encode_into(writer)
            }
            Self::Open { doc, access, mode } => {
                writer.write_u8(19)?;
                doc.encode_into(writer)?;
                writer.write_u8(*access)?;
                writer.write_u8(*mode)?;
                Ok(())
            }
            Self::Close { doc } => {
                writer.write_u8(20)?;
                doc.encode_into(writer)
            }
            Self::DumpState => writer.write_u8(21).map_err(Into::into),
            Self::Quit => writer.write_u8(22).map_err(Into::into),
            Self::FindNextNLinksFromToThree { from, to, three, after, n } => {
                writer.write_u8(23)?;
                encode_optional_specset(writer, from)?;
                encode_optional_specset(writer, to)?;
                encode_optional_specset(writer, three)?;
                encode_optional_tumbler(writer, after)?;
                writer.write_u32::<BigEndian>(*n).map_err(Into::into)
            }
        }
    }
}

impl Decode for Request {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let tag = reader.read_u8()?;
        Ok(match tag {
            1 => Self::FindDocsContaining { specset: decode_specset(reader)? },
            2 => Self::Copy {
                doc: Tumbler::decode_from(reader)?,
                vsa: Tumbler::decode_from(reader)?,
                specset: decode_specset(reader)?,
            },
            3 => {
                let doc = Tumbler::decode_from(reader)?;
                let vsa = Tumbler::decode_from(reader)?;
                let len = reader.read_u32::<BigEndian>()?;
                let mut text = vec![0u8; len as usize];
                reader.read_exact(&mut text)?;
                Self::Insert { doc, vsa, text }
            }
            4 => Self::CreateLink {
                doc: Tumbler::decode_from(reader)?,
                from: decode_specset(reader)?,
                to: decode_specset(reader)?,
                three: decode_specset(reader)?,
            },
            5 => Self::FollowLink {
                link: Tumbler::decode_from(reader)?,
                which: LinkEnd::decode_from(reader)?,
            },
            6 => Self::CreateNewVersion { doc: Tumbler::decode_from(reader)? },
            7 => Self::CreateNewDocument { account: Tumbler::decode_from(reader)? },
            8 => Self::RetrieveDocVspanSet { doc: Tumbler::decode_from(reader)? },
            9 => Self::RetrieveDocVspan { doc: Tumbler::decode_from(reader)? },
            10 => Self::Rearrange {
                doc: Tumbler::decode_from(reader)?,
                cutseq: decode_cutseq(reader)?,
            },
            11 => Self::DeleteVspan {
                doc: Tumbler::decode_from(reader)?,
                vspan: Span::decode_from(reader)?,
            },
            12 => Self::RetrieveV { specset: decode_specset(reader)? },
            13 => Self::RetrieveEndSets { link: Tumbler::decode_from(reader)? },
            14 => Self::FindLinksFromToThree {
                from: decode_optional_specset(reader)?,
                to: decode_optional_specset(reader)?,
                three: decode_optional_specset(reader)?,
            },
            15 => Self::FindNumOfLinksFromToThree {
                from: decode_optional_specset(reader)?,
                to: decode_optional_specset(reader)?,
                three: decode_optional_specset(reader)?,
            },
            16 => Self::ShowRelationOf2Versions {
                version1: decode_specset(reader)?,
                version2: decode_specset(reader)?,
            },
            17 => Self::CreateNodeOrAccount { isa: Tumbler::decode_from(reader)? },
            18 => Self::XAccount { account: Tumbler::decode_from(reader)? },
            19 => Self::Open {
                doc: Tumbler::decode_from(reader)?,
                access: reader.read_u8()?,
                mode: reader.read_u8()?,
            },
            20 => Self::Close { doc: Tumbler::decode_from(reader)? },
            21 => Self::DumpState,
            22 => Self::Quit,
            23 => Self::FindNextNLinksFromToThree {
                from: decode_optional_specset(reader)?,
                to: decode_optional_specset(reader)?,
                three: decode_optional_specset(reader)?,
                after: decode_optional_tumbler(reader)?,
                n: reader.read_u32::<BigEndian>()?,
            },
            other => return Err(DecodeError::InvalidTag(other)),
        })
    }
}

/// A reply to a [`Request`]. `Ok`'s payload shape depends on which request
/// it answers; this stays an untyped bag of the primitives every response
/// is built from, matching the way `do1.c`'s routines return either a
/// `bool` or fill an out-parameter of request-specific type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The request succeeded with no further payload.
    Ack,
    /// The request was refused (e.g. an unknown document, a conflicting
    /// open).
    Refused,
    /// An isa was produced (`CreateLink`, `CreateNewDocument`, ...).
    Isa(Tumbler),
    /// Retrieved text bytes.
    Text(Vec<u8>),
    /// A specset payload (`FollowLink`, `RetrieveEndSets`'s three calls
    /// combined by the caller).
    Specset(Specset),
    /// A set of v-spans.
    Vspans(Vec<Span>),
    /// A set of isas (`FindLinksFromToThree`, `FindDocsContaining`).
    Isas(Vec<Tumbler>),
    /// A count (`FindNumOfLinksFromToThree`).
    Count(u64),
}

impl Encode for Response {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        match self {
            Self::Ack => writer.write_u8(0).map_err(Into::into),
            Self::Refused => writer.write_u8(1).map_err(Into::into),
            Self::Isa(isa) => {
                writer.write_u8(2)?;
                isa.encode_into(writer)
            }
            Self::Text(bytes) => {
                writer.write_u8(3)?;
                #[allow(clippy::cast_possible_truncation)]
                writer.write_u32::<BigEndian>(bytes.len() as u32)?;
                writer.write_all(bytes)?;
                Ok(())
            }
            Self::Specset(specset) => {
                writer.write_u8(4)?;
                encode_specset(writer, specset)
            }
            Self::Vspans(spans) => {
                writer.write_u8(5)?;
                encode_vec(writer, spans)
            }
            Self::Isas(isas) => {
                writer.write_u8(6)?;
                encode_vec(writer, isas)
            }
            Self::Count(n) => {
                writer.write_u8(7)?;
                writer.write_u64::<BigEndian>(*n)?;
                Ok(())
            }
        }
    }
}

impl Decode for Response {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let tag = reader.read_u8()?;
        Ok(match tag {
            0 => Self::Ack,
            1 => Self::Refused,
            2 => Self::Isa(Tumbler::decode_from(reader)?),
            3 => {
                let len = reader.read_u32::<BigEndian>()?;
                let mut bytes = vec![0u8; len as usize];
                reader.read_exact(&mut bytes)?;
                Self::Text(bytes)
            }
            4 => Self::Specset(decode_specset(reader)?),
            5 => Self::Vspans(decode_vec(reader)?),
            6 => Self::Isas(decode_vec(reader)?),
            7 => Self::Count(reader.read_u64::<BigEndian>()?),
            other => return Err(DecodeError::InvalidTag(other)),
        })
    }
}
