//! Fiscal numbering authorizations (CAI ranges).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use telstock_core::{DomainError, DomainResult, StoreId};

telstock_core::entity_id! {
    /// Identifier of a numbering authorization.
    pub struct AuthorizationId
}

/// Fiscal document class a range is authorized for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DteDocumentType {
    Factura,
    NotaCredito,
    NotaDebito,
}

impl DteDocumentType {
    pub fn as_str(self) -> &'static str {
        match self {
            DteDocumentType::Factura => "FACTURA",
            DteDocumentType::NotaCredito => "NOTA_CREDITO",
            DteDocumentType::NotaDebito => "NOTA_DEBITO",
        }
    }
}

impl core::fmt::Display for DteDocumentType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Insert payload for a new authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAuthorization {
    pub document_type: DteDocumentType,
    pub series: String,
    /// `None` authorizes every store (global scope).
    pub store_id: Option<StoreId>,
    pub range_start: i64,
    pub range_end: i64,
    pub cai: String,
    pub expires_at: Option<NaiveDate>,
}

impl NewAuthorization {
    pub fn validate(&self) -> DomainResult<()> {
        if self.range_start < 1 {
            return Err(DomainError::invalid_quantity(format!(
                "range must start at 1 or above, got {}",
                self.range_start
            )));
        }
        if self.range_start > self.range_end {
            return Err(DomainError::invalid_quantity(format!(
                "empty range [{}, {}]",
                self.range_start, self.range_end
            )));
        }
        Ok(())
    }

    pub fn into_authorization(self, id: AuthorizationId) -> DteAuthorization {
        DteAuthorization {
            id,
            document_type: self.document_type,
            series: self.series,
            store_id: self.store_id,
            range_start: self.range_start,
            range_end: self.range_end,
            current_number: self.range_start,
            cai: self.cai,
            expires_at: self.expires_at,
            active: true,
            created_at: Utc::now(),
        }
    }
}

/// An authorized numbering range for one (document type, series, scope).
///
/// `current_number` is the next folio to hand out; it only moves forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DteAuthorization {
    pub id: AuthorizationId,
    pub document_type: DteDocumentType,
    pub series: String,
    pub store_id: Option<StoreId>,
    pub range_start: i64,
    pub range_end: i64,
    pub current_number: i64,
    pub cai: String,
    pub expires_at: Option<NaiveDate>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl DteAuthorization {
    /// The folio the next reservation will return, exhaustion aside.
    pub fn next_folio(&self) -> i64 {
        self.current_number.max(self.range_start)
    }

    pub fn remaining(&self) -> i64 {
        (self.range_end - self.next_folio() + 1).max(0)
    }

    /// Hand out the next folio and advance the cursor.
    ///
    /// Callers must hold the authorization row exclusively for the duration;
    /// the in-memory store's single-writer transaction provides that.
    pub fn reserve_next(&mut self) -> DomainResult<i64> {
        let next = self.next_folio();
        if next > self.range_end {
            return Err(DomainError::authorization_exhausted(format!(
                "authorization {} for {} {}: range [{}, {}] exhausted",
                self.id, self.document_type, self.series, self.range_start, self.range_end
            )));
        }
        self.current_number = next + 1;
        Ok(next)
    }

    /// Whether this range collides with a proposed one. Global scope
    /// (no store) collides with every store-scoped range and vice versa.
    pub fn conflicts_with(&self, candidate: &NewAuthorization) -> bool {
        self.document_type == candidate.document_type
            && self.series == candidate.series
            && scopes_intersect(self.store_id, candidate.store_id)
            && self.range_start <= candidate.range_end
            && candidate.range_start <= self.range_end
    }

    /// Wire representation consumed by fiscal tooling.
    pub fn payload(&self) -> Value {
        json!({
            "documentType": self.document_type,
            "serie": self.series,
            "storeId": self.store_id,
            "rangeStart": self.range_start,
            "rangeEnd": self.range_end,
            "cai": self.cai,
            "expirationDate": self.expires_at,
            "active": self.active,
        })
    }
}

fn scopes_intersect(a: Option<StoreId>, b: Option<StoreId>) -> bool {
    match (a, b) {
        (None, _) | (_, None) => true,
        (Some(a), Some(b)) => a == b,
    }
}

#[cfg(test)]
mod tests {
    use telstock_core::ValidationCode;

    use super::*;

    fn new_auth(store_id: Option<i64>, range_start: i64, range_end: i64) -> NewAuthorization {
        NewAuthorization {
            document_type: DteDocumentType::Factura,
            series: "A-001".into(),
            store_id: store_id.map(StoreId::new),
            range_start,
            range_end,
            cai: "254F8-612A1".into(),
            expires_at: None,
        }
    }

    #[test]
    fn reservation_walks_the_range_and_exhausts() {
        let mut auth = new_auth(Some(1), 1, 5).into_authorization(AuthorizationId::new(1));

        for expected in 1..=5 {
            assert_eq!(auth.reserve_next().unwrap(), expected);
        }
        let err = auth.reserve_next().unwrap_err();
        assert_eq!(err.code(), Some(ValidationCode::AuthorizationExhausted));
        assert_eq!(auth.current_number, 6);
    }

    #[test]
    fn cursor_below_range_start_snaps_up() {
        let mut auth = new_auth(Some(1), 100, 199).into_authorization(AuthorizationId::new(1));
        auth.current_number = 7;
        assert_eq!(auth.reserve_next().unwrap(), 100);
        assert_eq!(auth.current_number, 101);
    }

    #[test]
    fn overlap_requires_same_type_series_and_scope() {
        let existing = new_auth(Some(1), 1, 100).into_authorization(AuthorizationId::new(1));

        assert!(existing.conflicts_with(&new_auth(Some(1), 50, 150)));
        assert!(!existing.conflicts_with(&new_auth(Some(1), 101, 200)));
        assert!(!existing.conflicts_with(&new_auth(Some(2), 50, 150)));

        let mut other_series = new_auth(Some(1), 50, 150);
        other_series.series = "B-002".into();
        assert!(!existing.conflicts_with(&other_series));

        let mut other_type = new_auth(Some(1), 50, 150);
        other_type.document_type = DteDocumentType::NotaCredito;
        assert!(!existing.conflicts_with(&other_type));
    }

    #[test]
    fn global_scope_collides_with_store_scope() {
        let global = new_auth(None, 1, 100).into_authorization(AuthorizationId::new(1));
        assert!(global.conflicts_with(&new_auth(Some(3), 80, 120)));

        let store_scoped = new_auth(Some(3), 1, 100).into_authorization(AuthorizationId::new(2));
        assert!(store_scoped.conflicts_with(&new_auth(None, 80, 120)));
    }

    #[test]
    fn degenerate_ranges_are_rejected() {
        assert_eq!(
            new_auth(Some(1), 5, 4).validate().unwrap_err().code(),
            Some(ValidationCode::InvalidQuantity)
        );
        assert_eq!(
            new_auth(Some(1), 0, 10).validate().unwrap_err().code(),
            Some(ValidationCode::InvalidQuantity)
        );
    }

    #[test]
    fn payload_uses_fiscal_wire_names() {
        let auth = new_auth(None, 1, 500).into_authorization(AuthorizationId::new(1));
        let payload = auth.payload();

        assert_eq!(payload["documentType"], "FACTURA");
        assert_eq!(payload["serie"], "A-001");
        assert_eq!(payload["storeId"], Value::Null);
        assert_eq!(payload["rangeStart"], 1);
        assert_eq!(payload["rangeEnd"], 500);
        assert_eq!(payload["active"], true);
    }
}
