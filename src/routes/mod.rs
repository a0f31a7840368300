pub mod access;
pub mod analyze;
pub mod checkout;
pub mod login;
pub mod scrape_helpers;
pub mod webhook;
