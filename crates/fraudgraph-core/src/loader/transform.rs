//! Row transforms: one function per node kind turning a [`SourceRow`] into
//! a typed attribute record.

use super::SourceRow;
use crate::geo::{GeoPoint, parse_location};
use crate::{
    AccountAttrs, DeviceAttrs, DocumentAttrs, IpAttrs, NodeAttributes, NodeKind, TransactionAttrs,
    TransformError, UserAttrs,
};
use tracing::warn;

/// Signature shared by all row transforms.
pub type Transform = fn(&SourceRow) -> Result<NodeAttributes, TransformError>;

/// The standard transform for a kind.
#[must_use]
pub fn for_kind(kind: NodeKind) -> Transform {
    match kind {
        NodeKind::User => user,
        NodeKind::Account => account,
        NodeKind::Device => device,
        NodeKind::IpAddress => ip_address,
        NodeKind::Document => document,
        NodeKind::Transaction => transaction,
    }
}

pub fn user(row: &SourceRow) -> Result<NodeAttributes, TransformError> {
    Ok(NodeAttributes::User(UserAttrs {
        name: text(row, "name")?,
        email: text(row, "email")?,
        phone: text(row, "phone")?,
        address_hash: text(row, "address_hash")?,
        risk_score: float(row, "risk_score")?,
        is_flagged: flag(row, "is_flagged"),
    }))
}

pub fn account(row: &SourceRow) -> Result<NodeAttributes, TransformError> {
    Ok(NodeAttributes::Account(AccountAttrs {
        balance: float(row, "balance")?,
        risk_score: float(row, "risk_score")?,
        is_flagged: flag(row, "is_flagged"),
    }))
}

pub fn device(row: &SourceRow) -> Result<NodeAttributes, TransformError> {
    Ok(NodeAttributes::Device(DeviceAttrs {
        location: location(row, "device_location"),
    }))
}

pub fn ip_address(row: &SourceRow) -> Result<NodeAttributes, TransformError> {
    Ok(NodeAttributes::IpAddress(IpAttrs {
        reputation: integer(row, "ip_reputation")?,
        location: location(row, "ip_location"),
    }))
}

pub fn document(row: &SourceRow) -> Result<NodeAttributes, TransformError> {
    Ok(NodeAttributes::Document(DocumentAttrs {
        doc_type: text(row, "doc_type")?,
    }))
}

pub fn transaction(row: &SourceRow) -> Result<NodeAttributes, TransformError> {
    let tx_type = row
        .value("type")
        .or_else(|| row.value("tx_type"))
        .unwrap_or("unknown")
        .to_string();
    Ok(NodeAttributes::Transaction(TransactionAttrs {
        amount: float(row, "amount")?,
        timestamp: text(row, "tx_ts")?,
        tx_type,
        location: location(row, "associated_location"),
    }))
}

// =============================================================================
// FIELD CONVERSIONS
// =============================================================================

/// Required column, empty allowed.
fn text(row: &SourceRow, column: &str) -> Result<String, TransformError> {
    row.field(column)
        .map(|v| v.trim().to_string())
        .ok_or_else(|| TransformError::new(column, "missing column"))
}

fn float(row: &SourceRow, column: &str) -> Result<f64, TransformError> {
    let raw = row
        .value(column)
        .ok_or_else(|| TransformError::new(column, "missing value"))?;
    let value: f64 = raw
        .parse()
        .map_err(|_| TransformError::new(column, format!("not a number: {raw:?}")))?;
    if !value.is_finite() {
        return Err(TransformError::new(column, format!("not finite: {raw:?}")));
    }
    Ok(value)
}

fn integer(row: &SourceRow, column: &str) -> Result<i64, TransformError> {
    let raw = row
        .value(column)
        .ok_or_else(|| TransformError::new(column, "missing value"))?;
    raw.parse()
        .map_err(|_| TransformError::new(column, format!("not an integer: {raw:?}")))
}

/// `true` only for a case-insensitive "true".
fn flag(row: &SourceRow, column: &str) -> bool {
    row.value(column)
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Optional geo column. An unparsable object keeps the row without a location.
fn location(row: &SourceRow, column: &str) -> Option<GeoPoint> {
    let raw = row.value(column)?;
    match parse_location(raw) {
        Ok(point) => point,
        Err(reason) => {
            warn!(line = row.line, column, %reason, "ignoring malformed location");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> SourceRow {
        SourceRow::from_pairs(2, pairs.iter().copied())
    }

    #[test]
    fn user_row() {
        let attrs = user(&row(&[
            ("user_id", "U1"),
            ("name", "Ana"),
            ("email", "ana@example.com"),
            ("phone", "555"),
            ("address_hash", "h1"),
            ("risk_score", "0.75"),
            ("is_flagged", "TRUE"),
        ]))
        .expect("transform");

        let NodeAttributes::User(u) = attrs else {
            unreachable!("user transform returns users");
        };
        assert_eq!(u.name, "Ana");
        assert!((u.risk_score - 0.75).abs() < f64::EPSILON);
        assert!(u.is_flagged);
    }

    #[test]
    fn flag_is_false_unless_true() {
        for raw in ["false", "1", "yes", ""] {
            let attrs = account(&row(&[
                ("balance", "1"),
                ("risk_score", "0"),
                ("is_flagged", raw),
            ]))
            .expect("transform");
            assert_eq!(attrs.get("is_flagged"), Some(crate::AttrValue::Bool(false)));
        }
    }

    #[test]
    fn malformed_numbers_fail() {
        let err = account(&row(&[("balance", "abc"), ("risk_score", "0")])).expect_err("bad");
        assert_eq!(err.column, "balance");

        let err = account(&row(&[("balance", "NaN"), ("risk_score", "0")])).expect_err("bad");
        assert_eq!(err.column, "balance");

        let err = ip_address(&row(&[("ip_reputation", "7.5")])).expect_err("bad");
        assert_eq!(err.column, "ip_reputation");
    }

    #[test]
    fn missing_text_column_fails() {
        let err = document(&row(&[("document_id", "D1")])).expect_err("bad");
        assert_eq!(err.column, "doc_type");
    }

    #[test]
    fn transaction_type_fallbacks() {
        let base = [("amount", "10"), ("tx_ts", "2024-01-01T00:00:00")];

        let with_type = transaction(&row(&[base[0], base[1], ("type", "wire")])).expect("tx");
        assert_eq!(with_type.get("tx_type"), Some(crate::AttrValue::Text("wire".into())));

        let with_tx_type =
            transaction(&row(&[base[0], base[1], ("tx_type", "cash")])).expect("tx");
        assert_eq!(with_tx_type.get("tx_type"), Some(crate::AttrValue::Text("cash".into())));

        let neither = transaction(&row(&base)).expect("tx");
        assert_eq!(neither.get("tx_type"), Some(crate::AttrValue::Text("unknown".into())));
    }

    #[test]
    fn bad_location_keeps_row() {
        let attrs = device(&row(&[("device_location", "{broken")])).expect("device");
        assert_eq!(attrs.get("location"), None);

        let attrs = device(&row(&[("device_location", r#"{"lat":1.0,"lon":2.0}"#)]))
            .expect("device");
        assert_eq!(
            attrs.get("location"),
            Some(crate::AttrValue::Geo(GeoPoint::new(1.0, 2.0)))
        );
    }

    #[test]
    fn for_kind_matches_kind() {
        let rows = row(&[]);
        for kind in NodeKind::ALL {
            if let Ok(attrs) = for_kind(kind)(&rows) {
                assert_eq!(attrs.kind(), kind);
            }
        }
    }
}
