// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Request dispatch: turns a decoded [`Request`](crate::wire::Request) into
//! the matching [`Engine`] call and an encoded [`Response`](crate::wire::Response).
//!
//! Grounded on `backend/get1.c` + `backend/do1.c`'s composition style: each
//! `get*` routine parses one request's arguments, then hands them straight
//! to its `do*` counterpart. [`Dispatcher::handle`] is that composition
//! collapsed into one step, since [`Request`](crate::wire::Request) already
//! carries parsed arguments rather than raw bytes to prompt for.

use crate::arena::TaskArena;
use crate::bert::{OpenAccess, OpenMode, OpenOutcome};
use crate::engine::Engine;
use crate::stop_signal::StopSignal;
use crate::wire::{Request, Response};

fn decode_access(tag: u8) -> OpenAccess {
    if tag == 0 {
        OpenAccess::Read
    } else {
        OpenAccess::Write
    }
}

fn decode_mode(tag: u8) -> OpenMode {
    match tag {
        0 => OpenMode::Only,
        1 => OpenMode::Copy,
        _ => OpenMode::CopyIf,
    }
}

/// Dispatches requests against a single [`Engine`] on behalf of one or more
/// connections.
///
/// Holds no connection state of its own beyond the [`StopSignal`] every
/// `QUIT` request trips — per-connection bookkeeping (open documents,
/// session account) lives in the engine's bert table and session map, keyed
/// by the `connection` id each call carries.
pub struct Dispatcher {
    engine: Engine,
    stop: StopSignal,
}

impl Dispatcher {
    /// Wraps `engine` for request handling, sharing `stop` with whatever
    /// owns the connection-accept loop.
    #[must_use]
    pub fn new(engine: Engine, stop: StopSignal) -> Self {
        Self { engine, stop }
    }

    /// Borrows the underlying engine, e.g. for `DUMPSTATE` tooling outside
    /// the request path.
    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Handles one request for `connection`, opening a task arena for the
    /// duration exactly as `do1.c`'s handlers run under a `typetask *`.
    pub fn handle(&mut self, connection: u64, request: Request) -> Response {
        let task = self.engine.open_task(connection);
        log::trace!("dispatching {request:?} for task {:?}", task.id());
        self.handle_with_task(&task, request)
    }

    fn handle_with_task(&mut self, task: &TaskArena, request: Request) -> Response {
        let connection = task.connection();

        match request {
            Request::FindDocsContaining { specset } => Response::Isas(self.engine.find_docs_containing(&specset)),

            Request::Copy { doc, vsa, specset } => {
                if self.engine.copy(connection, &doc, &vsa, &specset) {
                    Response::Ack
                } else {
                    Response::Refused
                }
            }

            Request::Insert { doc, vsa, text } => {
                if self.engine.insert(connection, &doc, &vsa, &text) {
                    Response::Ack
                } else {
                    Response::Refused
                }
            }

            Request::CreateLink { doc, from, to, three } => Response::Isa(self.engine.create_link(&doc, &from, &to, &three)),

            Request::FollowLink { link, which } => match self.engine.follow_link(&link, which) {
                Some(specset) => Response::Specset(specset),
                None => Response::Refused,
            },

            Request::CreateNewVersion { doc } => Response::Isa(self.engine.create_new_version(connection, &doc)),

            Request::CreateNewDocument { account } => Response::Isa(self.engine.create_new_document(&account)),

            Request::RetrieveDocVspanSet { doc } => match self.engine.retrieve_doc_vspanset(&doc) {
                Some(vspans) => Response::Vspans(vspans),
                None => Response::Refused,
            },

            Request::RetrieveDocVspan { doc } => match self.engine.retrieve_doc_vspan(&doc) {
                Some(vspan) => Response::Vspans(vec![vspan]),
                None => Response::Refused,
            },

            Request::Rearrange { doc, cutseq } => {
                if self.engine.rearrange(connection, &doc, &cutseq) {
                    Response::Ack
                } else {
                    Response::Refused
                }
            }

            Request::DeleteVspan { doc, vspan } => {
                if self.engine.delete_vspan(connection, &doc, &vspan) {
                    Response::Ack
                } else {
                    Response::Refused
                }
            }

            Request::RetrieveV { specset } => match self.engine.retrieve_v(&specset) {
                Some(bytes) => Response::Text(bytes),
                None => Response::Refused,
            },

            Request::RetrieveEndSets { link } => match self.engine.retrieve_end_sets(&link) {
                Some((from, to, three)) => {
                    let mut combined = from;
                    combined.extend(to);
                    combined.extend(three);
                    Response::Specset(combined)
                }
                None => Response::Refused,
            },

            Request::FindLinksFromToThree { from, to, three } => Response::Isas(self.engine.find_links_from_to_three(
                from.as_ref(),
                to.as_ref(),
                three.as_ref(),
            )),

            Request::FindNumOfLinksFromToThree { from, to, three } => {
                #[allow(clippy::cast_possible_truncation)]
                Response::Count(self.engine.find_num_of_links_from_to_three(from.as_ref(), to.as_ref(), three.as_ref()) as u64)
            }

            Request::FindNextNLinksFromToThree { from, to, three, after, n } => {
                #[allow(clippy::cast_possible_truncation)]
                Response::Isas(self.engine.find_next_n_links_from_to_three(
                    from.as_ref(),
                    to.as_ref(),
                    three.as_ref(),
                    after.as_ref(),
                    n as usize,
                ))
            }

            Request::ShowRelationOf2Versions { version1, version2 } => {
                Response::Vspans(pairs_to_spans(&self.engine.show_relation_of_2_versions(&version1, &version2)))
            }

            Request::CreateNodeOrAccount { isa } => Response::Isa(self.engine.create_node_or_account(&isa)),

            Request::XAccount { account } => {
                self.engine.set_session_account(connection, account.clone());
                Response::Isa(account)
            }

            Request::Open { doc, access, mode } => {
                let (outcome, isa) = self.engine.open_document(connection, &doc, decode_access(access), decode_mode(mode));
                match outcome {
                    OpenOutcome::Refused => Response::Refused,
                    OpenOutcome::OpenedExisting | OpenOutcome::OpenedNewVersion => Response::Isa(isa),
                }
            }

            Request::Close { doc } => {
                self.engine.close_document(connection, &doc);
                Response::Ack
            }

            Request::DumpState => {
                let dump = self.engine.dump_state();
                #[allow(clippy::cast_possible_truncation)]
                Response::Count(dump.documents.len() as u64)
            }

            Request::Quit => {
                log::info!("connection {connection} requested shutdown");
                self.stop.send();
                Response::Ack
            }
        }
    }
}

fn pairs_to_spans(pairs: &crate::item::SpanPairSet) -> Vec<crate::item::Span> {
    pairs.iter().map(|p| crate::item::Span::new(p.stream1.clone(), p.width.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::tumbler::Tumbler;
    use test_log::test;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Config::default().open(), StopSignal::default())
    }

    fn tb(d: &[i64]) -> Tumbler {
        Tumbler::from_digits(false, d.to_vec())
    }

    #[test]
    fn create_node_or_account_then_insert_then_retrieve() {
        let mut d = dispatcher();

        let account = match d.handle(1, Request::CreateNodeOrAccount { isa: tb(&[1, 1]) }) {
            Response::Isa(isa) => isa,
            other => panic!("unexpected {other:?}"),
        };

        let doc = match d.handle(1, Request::CreateNewDocument { account }) {
            Response::Isa(isa) => isa,
            other => panic!("unexpected {other:?}"),
        };

        assert_eq!(
            Response::Ack,
            d.handle(
                1,
                Request::Insert {
                    doc: doc.clone(),
                    vsa: tb(&[1, 1]),
                    text: b"hello".to_vec(),
                }
            )
        );

        let specset = vec![crate::item::Vspec::new(doc, vec![crate::item::Span::new(tb(&[1, 1]), tb(&[5]))])];
        assert_eq!(Response::Text(b"hello".to_vec()), d.handle(1, Request::RetrieveV { specset }));
    }

    #[test]
    fn quit_trips_the_stop_signal() {
        let mut d = dispatcher();
        assert!(!d.stop.is_stopped());
        assert_eq!(Response::Ack, d.handle(1, Request::Quit));
        assert!(d.stop.is_stopped());
    }

    #[test]
    fn insert_on_unknown_document_is_refused() {
        let mut d = dispatcher();
        let response = d.handle(
            1,
            Request::Insert {
                doc: tb(&[9, 9]),
                vsa: tb(&[1, 1]),
                text: b"x".to_vec(),
            },
        );
        assert_eq!(Response::Refused, response);
    }
}
