//! Credential gating: which exchanges may take part in a scan.

use common::{CredentialField, CredentialSet, Credentials, ExchangeId};

/// True when every `required` field is present and not blank.
pub fn is_gated(credentials: Option<&CredentialSet>, required: &[CredentialField]) -> bool {
    let Some(set) = credentials else {
        return false;
    };
    required
        .iter()
        .all(|field| set.field(*field).is_some_and(|v| !v.trim().is_empty()))
}

/// The subset of `exchanges` whose declared requirements are met, in the
/// given order.
pub fn gated_exchanges(exchanges: &[ExchangeId], credentials: &Credentials) -> Vec<ExchangeId> {
    exchanges
        .iter()
        .copied()
        .filter(|id| is_gated(credentials.get(*id), id.required_credentials()))
        .collect()
}

/// Names of required fields that are missing or blank, for user feedback.
pub fn missing_fields(exchange: ExchangeId, credentials: &Credentials) -> Vec<&'static str> {
    let set = credentials.get(exchange);
    exchange
        .required_credentials()
        .iter()
        .filter(|field| {
            !set.and_then(|s| s.field(**field))
                .is_some_and(|v| !v.trim().is_empty())
        })
        .map(|field| field.as_str())
        .collect()
}
