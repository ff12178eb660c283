//! Evidence classification for fee claims.
//!
//! A resolved transaction counts as a claim when, in order:
//! 1. the subject is the fee-paying signer,
//! 2. the program of interest is involved (account key or instruction),
//! 3. at least one account balance increased.
//!
//! Accepted transactions are then scanned for a claimable token address.
//! Rejections are silent apart from debug logging; most scanned
//! transactions are not claims.

use crate::types::{Address, DetailRecord, EvidenceExtra, EvidenceItem, ProgramInvolvement};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const WRAPPED_SOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const SYSTEM_PROGRAM: &str = "11111111111111111111111111111111";
pub const COMPUTE_BUDGET_PROGRAM: &str = "ComputeBudget111111111111111111111111111111";

/// Well-known programs and mints that are never the claimed token.
pub const INFRASTRUCTURE_ADDRESSES: &[&str] = &[
    TOKEN_PROGRAM,
    WRAPPED_SOL_MINT,
    SYSTEM_PROGRAM,
    COMPUTE_BUDGET_PROGRAM,
];

/// Decimal places of a lamport amount expressed in SOL.
const LAMPORT_DECIMALS: u32 = 9;

/// Naming convention of launchpad tokens: fixed length and vanity suffix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPattern {
    pub length: usize,
    pub suffix: String,
}

impl Default for TokenPattern {
    fn default() -> Self {
        Self {
            length: 44,
            suffix: "BAGS".to_string(),
        }
    }
}

impl TokenPattern {
    pub fn matches(&self, address: &Address) -> bool {
        let raw = address.as_str();
        raw.len() == self.length && raw.ends_with(&self.suffix)
    }
}

pub fn is_infrastructure(address: &Address) -> bool {
    INFRASTRUCTURE_ADDRESSES.contains(&address.as_str())
}

/// The subject paid for and signed the transaction.
pub fn is_signed_by(record: &DetailRecord, subject: &Address) -> bool {
    record.fee_payer() == subject
}

/// Where, if anywhere, `program` appears in the transaction.
pub fn program_involvement(record: &DetailRecord, program: &Address) -> Option<ProgramInvolvement> {
    if record.account_keys.contains(program) {
        Some(ProgramInvolvement::AccountKey)
    } else if record.referenced_programs.contains(program) {
        Some(ProgramInvolvement::Instruction)
    } else {
        None
    }
}

pub fn has_positive_delta(record: &DetailRecord) -> bool {
    record.balance_deltas.values().any(|delta| *delta > 0)
}

/// First account matching the token pattern, skipping infrastructure,
/// the subject and the program of interest.
pub fn find_subject_token(
    record: &DetailRecord,
    subject: &Address,
    program: &Address,
    pattern: &TokenPattern,
) -> Option<Address> {
    record
        .account_keys
        .iter()
        .filter(|account| *account != subject && *account != program && !is_infrastructure(account))
        .find(|account| pattern.matches(account))
        .cloned()
}

/// Amount credited to the fee payer, in SOL.
pub fn claimed_amount(record: &DetailRecord) -> Option<Decimal> {
    let delta = record.delta_at(0);
    (delta > 0).then(|| Decimal::new(delta, LAMPORT_DECIMALS).normalize())
}

/// Classifies resolved transactions against one program of interest.
#[derive(Debug, Clone)]
pub struct EvidenceClassifier {
    program: Address,
    pattern: TokenPattern,
}

impl EvidenceClassifier {
    pub fn new(program: Address, pattern: TokenPattern) -> Self {
        Self { program, pattern }
    }

    pub fn program(&self) -> &Address {
        &self.program
    }

    /// Run the predicate chain; `None` means "not a claim".
    pub fn classify(&self, record: &DetailRecord, subject: &Address) -> Option<EvidenceItem> {
        if !is_signed_by(record, subject) {
            debug!("Wallet {}... is not signer in {}", subject.short(), record.id);
            return None;
        }

        let Some(involvement) = program_involvement(record, &self.program) else {
            debug!("{} does not involve {}", record.id, self.program.short());
            return None;
        };

        if !has_positive_delta(record) {
            debug!("{} involves the program but credits no account", record.id);
            return None;
        }

        let credits: Vec<i64> = record
            .balance_deltas
            .values()
            .copied()
            .filter(|delta| *delta > 0)
            .collect();
        let subject_token = find_subject_token(record, subject, &self.program, &self.pattern);

        match &subject_token {
            Some(token) => info!("Found fee claim in {} for token {}", record.id, token),
            None => info!("Found fee claim in {} without a recognizable token", record.id),
        }

        Some(EvidenceItem {
            source_id: record.id.clone(),
            subject_token,
            claimed_amount: claimed_amount(record),
            timestamp: record.block_time,
            extra: EvidenceExtra {
                involvement,
                credited_accounts: credits.len(),
                largest_credit_lamports: credits.into_iter().max().unwrap_or(0),
            },
        })
    }
}

/// Classify with the default token pattern.
pub fn classify(
    record: &DetailRecord,
    subject: &Address,
    program_of_interest: &Address,
) -> Option<EvidenceItem> {
    EvidenceClassifier::new(program_of_interest.clone(), TokenPattern::default())
        .classify(record, subject)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_FEE_PROGRAM;
    use nonempty::NonEmpty;
    use rust_decimal_macros::dec;
    use std::collections::{BTreeMap, BTreeSet};

    const SUBJECT: &str = "Subj1111111111111111111111111111111111111111";
    const BAGS_TOKEN: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosBAGS";

    fn addr(raw: &str) -> Address {
        Address::parse(raw).unwrap()
    }

    fn record(signer: &str, accounts: &[&str], deltas: &[(usize, i64)]) -> DetailRecord {
        let mut keys = vec![addr(signer)];
        keys.extend(accounts.iter().map(|a| addr(a)));
        DetailRecord {
            id: "sig-1".to_string(),
            signers: NonEmpty::new(addr(signer)),
            account_keys: keys,
            referenced_programs: BTreeSet::new(),
            balance_deltas: deltas.iter().copied().collect::<BTreeMap<_, _>>(),
            block_time: None,
        }
    }

    fn program() -> Address {
        addr(DEFAULT_FEE_PROGRAM)
    }

    #[test]
    fn test_single_valid_claim() {
        let rec = record(SUBJECT, &[DEFAULT_FEE_PROGRAM, BAGS_TOKEN], &[(0, 500_000)]);

        let item = classify(&rec, &addr(SUBJECT), &program()).unwrap();

        assert_eq!(item.source_id, "sig-1");
        assert_eq!(item.subject_token, Some(addr(BAGS_TOKEN)));
        assert_eq!(item.claimed_amount, Some(dec!(0.0005)));
        assert_eq!(item.extra.involvement, ProgramInvolvement::AccountKey);
        assert_eq!(item.extra.largest_credit_lamports, 500_000);
    }

    #[test]
    fn test_other_signer_is_rejected_first() {
        let rec = record("Someone11111", &[SUBJECT, DEFAULT_FEE_PROGRAM, BAGS_TOKEN], &[(1, 900)]);

        assert!(classify(&rec, &addr(SUBJECT), &program()).is_none());
    }

    #[test]
    fn test_program_found_through_instruction() {
        let mut rec = record(SUBJECT, &[BAGS_TOKEN], &[(0, 10)]);
        rec.referenced_programs.insert(program());

        let item = classify(&rec, &addr(SUBJECT), &program()).unwrap();
        assert_eq!(item.extra.involvement, ProgramInvolvement::Instruction);
    }

    #[test]
    fn test_missing_program_is_rejected() {
        let rec = record(SUBJECT, &[BAGS_TOKEN], &[(0, 10)]);

        assert!(classify(&rec, &addr(SUBJECT), &program()).is_none());
    }

    #[test]
    fn test_no_positive_delta_is_rejected() {
        let rec = record(SUBJECT, &[DEFAULT_FEE_PROGRAM], &[(0, -5_000), (1, 0)]);

        assert!(classify(&rec, &addr(SUBJECT), &program()).is_none());
    }

    #[test]
    fn test_claim_without_token_is_still_evidence() {
        let rec = record(SUBJECT, &[DEFAULT_FEE_PROGRAM, "Vault111"], &[(0, -5_000), (1, 77)]);

        let item = classify(&rec, &addr(SUBJECT), &program()).unwrap();

        assert_eq!(item.subject_token, None);
        assert_eq!(item.claimed_amount, None);
        assert_eq!(item.extra.credited_accounts, 1);
    }

    #[test]
    fn test_token_pattern_requires_length_and_suffix() {
        let pattern = TokenPattern::default();

        assert!(pattern.matches(&addr(BAGS_TOKEN)));
        assert!(!pattern.matches(&addr("shortBAGS")));
        assert!(!pattern.matches(&addr("7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJospump")));
    }

    #[test]
    fn test_token_search_skips_subject_and_infrastructure() {
        let subject_like = "AAAAtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosBAGS";
        let keys = [TOKEN_PROGRAM, DEFAULT_FEE_PROGRAM, BAGS_TOKEN];
        let rec = record(subject_like, &keys, &[(0, 1)]);

        let token =
            find_subject_token(&rec, &addr(subject_like), &program(), &TokenPattern::default());
        assert_eq!(token, Some(addr(BAGS_TOKEN)));
    }

    #[test]
    fn test_infrastructure_constants() {
        assert!(is_infrastructure(&addr(SYSTEM_PROGRAM)));
        assert!(is_infrastructure(&addr(WRAPPED_SOL_MINT)));
        assert!(!is_infrastructure(&addr(BAGS_TOKEN)));
    }
}
