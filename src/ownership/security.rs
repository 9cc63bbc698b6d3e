use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

use super::model::{stable_id, DerivativeSecurity, Security, SecurityType};
use super::report::SkipReason;
use crate::edgar::parsing::text::clean_text;

/// Terms of a derivative instrument as reported on a transaction or holding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivativeTerms {
    pub underlying_title: Option<String>,
    pub conversion_price: Option<Decimal>,
    pub exercise_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
}

/// Case and whitespace insensitive lookup key for a security title.
pub fn title_key(title: &str) -> String {
    clean_text(title).to_lowercase()
}

/// Guesses the instrument type from its title.
pub fn classify_security(title: &str, is_derivative: bool) -> SecurityType {
    if !is_derivative {
        return SecurityType::Equity;
    }
    let lowered = title.to_lowercase();
    if lowered.contains("option") {
        SecurityType::Option
    } else if ["convertible", "preferred", "note"]
        .iter()
        .any(|word| lowered.contains(word))
    {
        SecurityType::Convertible
    } else {
        SecurityType::OtherDerivative
    }
}

fn price_key(price: Option<Decimal>) -> String {
    price.map(|p| p.normalize().to_string()).unwrap_or_default()
}

/// Canonical security rows for one batch of filings.
///
/// Lookups are keyed by (issuer, title) and, for derivatives, by
/// (security, underlying title, conversion price); a repeated key returns the
/// existing row.
#[derive(Debug, Default)]
pub struct SecurityResolver {
    securities: Vec<Security>,
    security_index: HashMap<(Uuid, String), usize>,
    derivatives: Vec<DerivativeSecurity>,
    derivative_index: HashMap<(Uuid, String, String), usize>,
}

impl SecurityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.securities.clear();
        self.security_index.clear();
        self.derivatives.clear();
        self.derivative_index.clear();
    }

    pub fn securities(&self) -> &[Security] {
        &self.securities
    }

    pub fn derivative_securities(&self) -> &[DerivativeSecurity] {
        &self.derivatives
    }

    pub fn security(&self, id: Uuid) -> Option<&Security> {
        self.securities.iter().find(|s| s.id == id)
    }

    pub fn resolve_security(
        &mut self,
        title: &str,
        issuer_entity_id: Uuid,
        is_derivative: bool,
    ) -> Result<Uuid, SkipReason> {
        let key = title_key(title);
        if key.is_empty() {
            return Err(SkipReason::MissingField("securityTitle".to_string()));
        }
        if let Some(&idx) = self.security_index.get(&(issuer_entity_id, key.clone())) {
            return Ok(self.securities[idx].id);
        }

        let security = Security {
            id: stable_id(&["security", &issuer_entity_id.to_string(), &key]),
            title: clean_text(title),
            issuer_entity_id,
            security_type: classify_security(title, is_derivative),
            standard_cusip: None,
        };
        log::debug!(
            "New security {:?} ({:?}) for issuer {}",
            security.title,
            security.security_type,
            issuer_entity_id
        );
        let id = security.id;
        self.security_index
            .insert((issuer_entity_id, key), self.securities.len());
        self.securities.push(security);
        Ok(id)
    }

    /// Looks up or creates the derivative row for `security_id`. The
    /// underlying is linked only to an equity security already resolved for
    /// the same issuer.
    pub fn resolve_derivative(
        &mut self,
        security_id: Uuid,
        terms: &DerivativeTerms,
    ) -> Result<Uuid, SkipReason> {
        let underlying_title = terms
            .underlying_title
            .as_deref()
            .map(clean_text)
            .filter(|t| !t.is_empty());
        let Some(underlying_title) = underlying_title else {
            let title = self
                .security(security_id)
                .map(|s| s.title.clone())
                .unwrap_or_else(|| security_id.to_string());
            return Err(SkipReason::UnresolvedDerivativeSecurity(title));
        };
        let Some(issuer_entity_id) = self.security(security_id).map(|s| s.issuer_entity_id) else {
            return Err(SkipReason::UnresolvedSecurity(security_id.to_string()));
        };

        let underlying_key = title_key(&underlying_title);
        let key = (
            security_id,
            underlying_key.clone(),
            price_key(terms.conversion_price),
        );

        if let Some(&idx) = self.derivative_index.get(&key) {
            let existing = &mut self.derivatives[idx];
            if existing.exercise_date.is_none() {
                existing.exercise_date = terms.exercise_date;
            }
            if existing.expiration_date.is_none() {
                existing.expiration_date = terms.expiration_date;
            }
            return Ok(existing.id);
        }

        let underlying_security_id = self
            .security_index
            .get(&(issuer_entity_id, underlying_key))
            .map(|&idx| &self.securities[idx])
            .filter(|s| s.security_type == SecurityType::Equity)
            .map(|s| s.id);

        let derivative = DerivativeSecurity {
            id: stable_id(&["derivative", &security_id.to_string(), &key.1, &key.2]),
            security_id,
            underlying_security_id,
            underlying_security_title: underlying_title,
            conversion_price: terms.conversion_price,
            exercise_date: terms.exercise_date,
            expiration_date: terms.expiration_date,
        };
        let id = derivative.id;
        self.derivative_index.insert(key, self.derivatives.len());
        self.derivatives.push(derivative);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_classify_security() {
        assert_eq!(classify_security("Common Stock", false), SecurityType::Equity);
        assert_eq!(classify_security("Stock Option (right to buy)", true), SecurityType::Option);
        assert_eq!(classify_security("Series A Preferred Stock", true), SecurityType::Convertible);
        assert_eq!(classify_security("Restricted Stock Units", true), SecurityType::OtherDerivative);
    }

    #[test]
    fn test_resolve_security_is_idempotent() {
        let issuer = Uuid::new_v4();
        let mut resolver = SecurityResolver::new();
        let a = resolver.resolve_security("Common Stock", issuer, false).unwrap();
        let b = resolver.resolve_security("  common   STOCK ", issuer, false).unwrap();
        assert_eq!(a, b);
        assert_eq!(resolver.securities().len(), 1);

        let other_issuer = resolver.resolve_security("Common Stock", Uuid::new_v4(), false).unwrap();
        assert_ne!(a, other_issuer);
        assert_eq!(
            resolver.resolve_security(" ", issuer, false),
            Err(SkipReason::MissingField("securityTitle".to_string()))
        );
    }

    #[test]
    fn test_resolve_derivative_links_underlying() {
        let issuer = Uuid::new_v4();
        let mut resolver = SecurityResolver::new();
        let common = resolver.resolve_security("Common Stock", issuer, false).unwrap();
        let option = resolver.resolve_security("Stock Option", issuer, true).unwrap();

        let terms = DerivativeTerms {
            underlying_title: Some("Common Stock".to_string()),
            conversion_price: Some(dec("12.50")),
            exercise_date: None,
            expiration_date: NaiveDate::from_ymd_opt(2030, 1, 1),
        };
        let first = resolver.resolve_derivative(option, &terms).unwrap();
        let again = resolver
            .resolve_derivative(
                option,
                &DerivativeTerms {
                    conversion_price: Some(dec("12.5")),
                    exercise_date: NaiveDate::from_ymd_opt(2024, 1, 1),
                    ..terms.clone()
                },
            )
            .unwrap();
        assert_eq!(first, again);
        assert_eq!(resolver.derivative_securities().len(), 1);
        let row = &resolver.derivative_securities()[0];
        assert_eq!(row.underlying_security_id, Some(common));
        assert_eq!(row.exercise_date, NaiveDate::from_ymd_opt(2024, 1, 1));

        let different_price = resolver
            .resolve_derivative(
                option,
                &DerivativeTerms {
                    conversion_price: Some(dec("20")),
                    ..terms.clone()
                },
            )
            .unwrap();
        assert_ne!(first, different_price);
    }

    #[test]
    fn test_derivative_without_underlying_is_rejected() {
        let issuer = Uuid::new_v4();
        let mut resolver = SecurityResolver::new();
        let option = resolver.resolve_security("Stock Option", issuer, true).unwrap();
        let err = resolver
            .resolve_derivative(option, &DerivativeTerms::default())
            .unwrap_err();
        assert_eq!(err, SkipReason::UnresolvedDerivativeSecurity("Stock Option".to_string()));

        let unlinked = resolver
            .resolve_derivative(
                option,
                &DerivativeTerms {
                    underlying_title: Some("Class B Stock".to_string()),
                    ..DerivativeTerms::default()
                },
            )
            .unwrap();
        let row = resolver
            .derivative_securities()
            .iter()
            .find(|d| d.id == unlinked)
            .unwrap();
        assert!(row.underlying_security_id.is_none());
    }
}
