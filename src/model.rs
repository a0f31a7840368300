use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

/// Entitlement record tying a buyer email to its access token.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::purchases)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Purchase {
    pub id: String,
    pub email: String,
    pub access_token: String,
    pub is_active: bool,
    pub stripe_session_id: String,
    pub stripe_customer_id: Option<String>,
    pub access_count: i32,
    pub last_access_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::purchases)]
pub struct NewPurchase<'a> {
    pub id: String,
    pub email: &'a str,
    pub access_token: &'a str,
    pub is_active: bool,
    pub stripe_session_id: &'a str,
    pub stripe_customer_id: Option<&'a str>,
    pub access_count: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl<'a> NewPurchase<'a> {
    pub fn new(
        email: &'a str,
        access_token: &'a str,
        stripe_session_id: &'a str,
        stripe_customer_id: Option<&'a str>,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4().to_string(),
            email,
            access_token,
            is_active: true,
            stripe_session_id,
            stripe_customer_id,
            access_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A confirmed payment as extracted from a checkout-completed event.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedCheckout {
    pub email: String,
    pub stripe_session_id: String,
    pub stripe_customer_id: Option<String>,
}

/// Lower-cases and trims an email so lookups and storage agree on one key.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_email_lowercases_and_trims() {
        assert_eq!(normalize_email("  Buyer@Example.COM "), "buyer@example.com");
    }

    #[test]
    fn new_purchase_starts_active_with_no_accesses() {
        let purchase = NewPurchase::new("a@b.c", "tok", "sess_1", None);
        assert!(purchase.is_active);
        assert_eq!(purchase.access_count, 0);
        assert_eq!(purchase.created_at, purchase.updated_at);
    }
}
