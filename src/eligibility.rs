use alloy_primitives::Address;
use std::collections::HashSet;

use crate::error::{AppError, AppResult};
use crate::ledger::Ledger;
use crate::types::{format_address, parse_token_id, TokenId};

/// Token ids a holder must all own for one season. Ordered, no duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredTokenSet {
    ids: Vec<TokenId>,
}

impl RequiredTokenSet {
    pub fn new(ids: impl IntoIterator<Item = TokenId>) -> Self {
        let mut seen = HashSet::new();
        let ids = ids.into_iter().filter(|id| seen.insert(*id)).collect();
        Self { ids }
    }

    pub fn from_u64s(ids: &[u64]) -> Self {
        Self::new(ids.iter().map(|id| TokenId::from(*id)))
    }

    pub fn parse(ids: &[String]) -> AppResult<Self> {
        let parsed = ids
            .iter()
            .map(|id| {
                parse_token_id(id)
                    .map_err(|_| AppError::Configuration(format!("Invalid required token id: {}", id)))
            })
            .collect::<AppResult<Vec<_>>>()?;
        Ok(Self::new(parsed))
    }

    pub fn ids(&self) -> &[TokenId] {
        &self.ids
    }

    pub fn contains(&self, id: &TokenId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// True iff `address` holds a positive balance of every required id.
pub fn is_qualified(address: &Address, ledger: &Ledger, required: &RequiredTokenSet) -> bool {
    let Some(tokens) = ledger.holdings(address) else {
        return required.is_empty();
    };
    required
        .ids()
        .iter()
        .all(|id| tokens.get(id).is_some_and(|balance| !balance.is_zero()))
}

/// Every ledger address that passes [`is_qualified`]. Unordered.
pub fn evaluate_all(ledger: &Ledger, required: &RequiredTokenSet) -> HashSet<Address> {
    ledger
        .addresses()
        .filter(|address| is_qualified(address, ledger, required))
        .copied()
        .collect()
}

/// Lowercase hex, sorted, for stable output files.
pub fn sorted_addresses(addresses: &HashSet<Address>) -> Vec<String> {
    let mut out: Vec<String> = addresses.iter().map(format_address).collect();
    out.sort();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::CreditPolicy;
    use crate::types::TransferEvent;
    use alloy_primitives::U256;
    use chrono::Utc;

    fn abc() -> Address {
        "0x0000000000000000000000000000000000000abc".parse().unwrap()
    }

    fn mint(ledger: &mut Ledger, to: Address, token: u64) {
        ledger.apply_transfer(&TransferEvent {
            from: Address::ZERO,
            to,
            token_id: U256::from(token),
            value: U256::from(1),
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn test_missing_token_then_mint_qualifies() {
        let required = RequiredTokenSet::from_u64s(&[100, 200, 300]);
        let mut ledger = Ledger::new(CreditPolicy::FullOwnership);
        mint(&mut ledger, abc(), 100);
        mint(&mut ledger, abc(), 200);

        assert!(!is_qualified(&abc(), &ledger, &required));

        mint(&mut ledger, abc(), 300);
        assert!(is_qualified(&abc(), &ledger, &required));
    }

    #[test]
    fn test_losing_any_required_token_disqualifies() {
        let required = RequiredTokenSet::from_u64s(&[100, 200, 300]);

        for dropped in [100u64, 200, 300] {
            let mut ledger = Ledger::new(CreditPolicy::FullOwnership);
            for id in [100, 200, 300] {
                mint(&mut ledger, abc(), id);
            }
            assert!(is_qualified(&abc(), &ledger, &required));

            ledger.apply_transfer(&TransferEvent {
                from: abc(),
                to: Address::ZERO,
                token_id: U256::from(dropped),
                value: U256::from(1),
                timestamp: Utc::now(),
            });
            assert!(!is_qualified(&abc(), &ledger, &required));
        }
    }

    #[test]
    fn test_unknown_address_is_not_qualified() {
        let required = RequiredTokenSet::from_u64s(&[100]);
        let ledger = Ledger::new(CreditPolicy::FullOwnership);
        assert!(!is_qualified(&abc(), &ledger, &required));
    }

    #[test]
    fn test_evaluate_all_selects_complete_holders() {
        let required = RequiredTokenSet::from_u64s(&[100, 101]);
        let other = Address::repeat_byte(0x11);
        let mut ledger = Ledger::new(CreditPolicy::FullOwnership);
        mint(&mut ledger, abc(), 100);
        mint(&mut ledger, abc(), 101);
        mint(&mut ledger, other, 100);

        let qualified = evaluate_all(&ledger, &required);
        assert_eq!(qualified.len(), 1);
        assert!(qualified.contains(&abc()));
        assert_eq!(
            sorted_addresses(&qualified),
            vec!["0x0000000000000000000000000000000000000abc".to_string()]
        );
    }

    #[test]
    fn test_required_set_drops_duplicates() {
        let required = RequiredTokenSet::parse(&["100".into(), "200".into(), "100".into()]).unwrap();
        assert_eq!(required.len(), 2);
        assert!(required.contains(&U256::from(200)));
        assert!(RequiredTokenSet::parse(&["abc".into()]).is_err());
    }
}
