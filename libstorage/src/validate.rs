//! Batch validation of raw connection maps.
//!
//! The validator normalizes loosely-typed connection requests into
//! typed descriptors, one per input item, preserving order.  It is
//! pure: no I/O, no probing.
//!
//! A missing required field anywhere in the batch fails the whole
//! validation call, before any item is processed.  Partial validation
//! followed by partial connection would leave an ambiguous system
//! state; a malformed request is a caller bug, not a runtime condition
//! to isolate per item.

use crate::error::StorageError;
use crate::types::{BlockConnection, DomainKind, FileConnection, LocalConnection, RawConnection};

/// A fully validated, homogeneous batch of connection descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Batch {
    File(Vec<FileConnection>),
    Local(Vec<LocalConnection>),
    Block(Vec<BlockConnection>),
}

impl Batch {
    /// Number of items in the batch.
    pub fn len(&self) -> usize {
        match self {
            Batch::File(v) => v.len(),
            Batch::Local(v) => v.len(),
            Batch::Block(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Validate a whole batch for the given domain kind.
///
/// Returns typed descriptors 1:1 with the input, in input order, or
/// the first [`StorageError::InvalidParameter`] encountered.
pub fn parse_batch(kind: DomainKind, batch: &[RawConnection]) -> Result<Batch, StorageError> {
    match kind {
        DomainKind::Nfs => batch
            .iter()
            .map(parse_file)
            .collect::<Result<_, _>>()
            .map(Batch::File),
        DomainKind::Local => batch
            .iter()
            .map(parse_local)
            .collect::<Result<_, _>>()
            .map(Batch::Local),
        DomainKind::Iscsi => batch
            .iter()
            .map(parse_block)
            .collect::<Result<_, _>>()
            .map(Batch::Block),
    }
}

/// Look up a required field, naming the field and the item's id (when
/// present) on failure.
fn required<'a>(con: &'a RawConnection, field: &str) -> Result<&'a str, StorageError> {
    con.get(field)
        .map(String::as_str)
        .ok_or_else(|| StorageError::missing_field(field, item_id(con)))
}

/// Best-effort item id for error messages; empty when the item has no
/// id of its own.
fn item_id(con: &RawConnection) -> &str {
    con.get("id").map(String::as_str).unwrap_or("")
}

fn parse_file(con: &RawConnection) -> Result<FileConnection, StorageError> {
    Ok(FileConnection {
        id: required(con, "id")?.to_owned(),
        remote_path: required(con, "connection")?.to_owned(),
    })
}

fn parse_local(con: &RawConnection) -> Result<LocalConnection, StorageError> {
    Ok(LocalConnection {
        id: required(con, "id")?.to_owned(),
        path: required(con, "connection")?.to_owned(),
    })
}

fn parse_block(con: &RawConnection) -> Result<BlockConnection, StorageError> {
    // An absent or empty IQN selects portal-level discovery; the
    // connector never re-checks this mid-flow.
    let iqn = con
        .get("iqn")
        .filter(|iqn| !iqn.is_empty())
        .map(String::to_owned);

    Ok(BlockConnection {
        id: required(con, "id")?.to_owned(),
        target_address: required(con, "connection")?.to_owned(),
        target_port: required(con, "port")?.to_owned(),
        iqn,
        tpgt: required(con, "portal")?.to_owned(),
        username: required(con, "user")?.to_owned(),
        password: required(con, "password")?.to_owned(),
        initiator_name: con.get("initiatorName").map(String::to_owned),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn raw(fields: &[(&str, &str)]) -> RawConnection {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>()
    }

    fn block_raw(id: &str, iqn: &str) -> RawConnection {
        raw(&[
            ("id", id),
            ("connection", "10.0.0.5"),
            ("port", "3260"),
            ("iqn", iqn),
            ("portal", "1"),
            ("user", "admin"),
            ("password", "secret"),
        ])
    }

    #[test]
    fn file_batch_preserves_order() {
        let batch = vec![
            raw(&[("id", "a"), ("connection", "h:/x")]),
            raw(&[("id", "b"), ("connection", "h:/y")]),
        ];
        let Batch::File(conns) = parse_batch(DomainKind::Nfs, &batch).unwrap() else {
            panic!("expected file batch");
        };
        assert_eq!(conns.len(), 2);
        assert_eq!(conns[0].id, "a");
        assert_eq!(conns[1].id, "b");
        assert_eq!(conns[1].remote_path, "h:/y");
    }

    #[test]
    fn missing_field_names_field_and_item() {
        let batch = vec![
            raw(&[("id", "ok"), ("connection", "h:/x")]),
            raw(&[("id", "broken")]),
        ];
        let err = parse_batch(DomainKind::Nfs, &batch).unwrap_err();
        let StorageError::InvalidParameter { field, detail } = err else {
            panic!("expected invalid parameter");
        };
        assert_eq!(field, "connection");
        assert!(detail.contains("broken"));
    }

    #[test]
    fn whole_batch_fails_on_one_bad_item() {
        let batch = vec![raw(&[("connection", "h:/x")])];
        assert!(parse_batch(DomainKind::Nfs, &batch).is_err());
    }

    #[test]
    fn empty_iqn_selects_portal_discovery() {
        let Batch::Block(conns) = parse_batch(DomainKind::Iscsi, &[block_raw("c1", "")]).unwrap()
        else {
            panic!("expected block batch");
        };
        assert!(conns[0].iqn.is_none());
        assert!(conns[0].initiator_name.is_none());
    }

    #[test]
    fn present_iqn_selects_node_login() {
        let Batch::Block(conns) =
            parse_batch(DomainKind::Iscsi, &[block_raw("c1", "iqn.2026-01.com.example:t1")])
                .unwrap()
        else {
            panic!("expected block batch");
        };
        assert_eq!(conns[0].iqn.as_deref(), Some("iqn.2026-01.com.example:t1"));
    }

    #[test]
    fn block_missing_port_is_rejected() {
        let mut con = block_raw("c1", "");
        con.remove("port");
        let err = parse_batch(DomainKind::Iscsi, &[con]).unwrap_err();
        let StorageError::InvalidParameter { field, .. } = err else {
            panic!("expected invalid parameter");
        };
        assert_eq!(field, "port");
    }
}
