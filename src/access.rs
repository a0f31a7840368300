//! Access verification.
//!
//! Two trust tiers coexist and stay separate: purchasers, whose capability is an access token
//! backed by the purchase store, and staff, whose identity is an email on a configured
//! allow-list. Staff identities never enter the purchase table.

use std::collections::HashSet;

use tracing::info;

use crate::error::{AppError, AppResult};
use crate::model::{normalize_email, Purchase};
use crate::store::PurchaseStore;

#[derive(Debug, Clone, Default)]
pub struct AdminAllowList {
    emails: HashSet<String>,
}

impl AdminAllowList {
    /// Parses a comma separated list; entries are normalized and blanks dropped.
    pub fn parse(raw: &str) -> Self {
        let emails = raw
            .split(',')
            .map(normalize_email)
            .filter(|e| !e.is_empty())
            .collect();
        Self { emails }
    }

    pub fn contains(&self, email: &str) -> bool {
        self.emails.contains(&normalize_email(email))
    }
}

/// Credentials presented by a client, already unmarshaled from cookies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCredentials {
    pub admin_email: Option<String>,
    pub access_token: Option<String>,
}

/// Who the caller was verified to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessGrant {
    Admin { email: String },
    Purchaser { email: String, is_admin: bool },
}

impl AccessGrant {
    pub fn email(&self) -> &str {
        match self {
            AccessGrant::Admin { email } | AccessGrant::Purchaser { email, .. } => email,
        }
    }

    pub fn is_admin(&self) -> bool {
        match self {
            AccessGrant::Admin { .. } => true,
            AccessGrant::Purchaser { is_admin, .. } => *is_admin,
        }
    }
}

fn ensure_active(purchase: Purchase) -> AppResult<Purchase> {
    if purchase.is_active {
        Ok(purchase)
    } else {
        Err(AppError::Forbidden)
    }
}

/// Landing-page check for an emailed token. The only path that records usage statistics.
pub fn verify_by_token(store: &PurchaseStore, token: &str) -> AppResult<Purchase> {
    let purchase = store
        .find_by_token(token)?
        .ok_or(AppError::InvalidToken)?;
    let purchase = ensure_active(purchase)?;
    let purchase = store.record_access(&purchase.id)?;
    info!(
        purchase_id = %purchase.id,
        access_count = purchase.access_count,
        "access token verified"
    );
    Ok(purchase)
}

/// Per-request session check. Reads only; the admin cookie short-circuits the store lookup.
pub fn verify_by_session(
    store: &PurchaseStore,
    admins: &AdminAllowList,
    credentials: &SessionCredentials,
) -> AppResult<AccessGrant> {
    if let Some(email) = credentials.admin_email.as_deref() {
        if admins.contains(email) {
            return Ok(AccessGrant::Admin {
                email: normalize_email(email),
            });
        }
    }

    let token = credentials
        .access_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthenticated)?;

    let purchase = store
        .find_by_token(token)?
        .ok_or(AppError::Unauthenticated)?;
    let purchase = ensure_active(purchase)?;

    Ok(AccessGrant::Purchaser {
        is_admin: admins.contains(&purchase.email),
        email: purchase.email,
    })
}
