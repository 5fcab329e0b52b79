//! Staking ledger for genesis
//!
//! Amounts in the ledger config and the allocations table are whole tokens.
//! The ledger holds base units: `tokens * 10^token_value_exponent`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, warn};

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::package::Address;

/// Token amount in base units. Serialized as a decimal string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quantity(u128);

impl Quantity {
    pub const ZERO: Self = Self(0);

    pub fn new(value: u128) -> Self {
        Self(value)
    }

    pub fn value(self) -> u128 {
        self.0
    }

    fn checked_add(self, other: Self) -> DomainResult<Self> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or_else(|| ledger_error("quantity overflow".into()))
    }

    fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

// ============================================================
// Ledger configuration (YAML)
// ============================================================

/// Column labels of the allocations table.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct CsvOptions {
    pub kyc_label: String,
    pub entity_package_submitted_label: String,
    pub entity_package_name_label: String,
    pub funding_label: String,
}

/// Funding and inbound delegations (account name to tokens) of one entity.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Allocation {
    #[serde(default)]
    pub delegations: BTreeMap<String, u64>,
    #[serde(default)]
    pub funds: u64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Number(u64),
    Text(String),
}

#[derive(Deserialize)]
struct RawAccount {
    amount: RawAmount,
    address: String,
    #[serde(default)]
    csv_label: String,
}

/// A pre-funded account that may delegate to entities.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(try_from = "RawAccount")]
pub struct AccountConfig {
    pub amount: u64,
    pub address: Address,
    /// Allocations table column holding this account's delegations
    pub csv_label: String,
}

impl TryFrom<RawAccount> for AccountConfig {
    type Error = String;

    fn try_from(raw: RawAccount) -> Result<Self, Self::Error> {
        let amount = match raw.amount {
            RawAmount::Number(n) => n,
            RawAmount::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| format!("invalid account amount {s:?}"))?,
        };
        let address = Address::parse(&raw.address)
            .ok_or_else(|| format!("invalid account address {:?}", raw.address))?;
        Ok(Self {
            amount,
            address,
            csv_label: raw.csv_label,
        })
    }
}

/// Staking ledger configuration. Account and entity names are lowercased on load.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LedgerConfig {
    pub minimum_balance: u64,
    pub total_supply: u64,
    pub token_symbol: String,
    pub token_value_exponent: u8,
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountConfig>,
    /// Extra allocations applied only to test networks
    #[serde(default)]
    pub test_only_entities: BTreeMap<String, Allocation>,
    pub commission_rate_max: u64,
    pub commission_rate_min: u64,
    pub commission_rate: u64,
    pub csv_options: CsvOptions,
}

impl LedgerConfig {
    pub fn from_yaml(text: &str) -> DomainResult<Self> {
        let mut config: Self = serde_yaml::from_str(text)
            .map_err(|e| DomainError::InvalidLedgerConfig(e.to_string()))?;
        config.accounts = lowercase_keys(std::mem::take(&mut config.accounts), "account")?;
        config.test_only_entities =
            lowercase_keys(std::mem::take(&mut config.test_only_entities), "test entity")?;
        Ok(config)
    }

    /// Base units per whole token.
    pub fn precision(&self) -> DomainResult<u128> {
        10u128
            .checked_pow(u32::from(self.token_value_exponent))
            .ok_or_else(|| {
                DomainError::InvalidLedgerConfig(format!(
                    "token_value_exponent {} is too large",
                    self.token_value_exponent
                ))
            })
    }
}

fn lowercase_keys<V>(map: BTreeMap<String, V>, what: &str) -> DomainResult<BTreeMap<String, V>> {
    let mut out = BTreeMap::new();
    for (name, value) in map {
        let key = name.to_lowercase();
        if out.insert(key.clone(), value).is_some() {
            return Err(DomainError::InvalidLedgerConfig(format!(
                "duplicate {what} name {key:?}"
            )));
        }
    }
    Ok(out)
}

// ============================================================
// Allocations table (CSV)
// ============================================================

const YES: &str = "TRUE";

/// Parse the allocations table into entity name to allocation.
///
/// Only rows whose package-submitted column is `TRUE` count. Funding is only
/// granted when the KYC column is `TRUE`. Numbers may contain `,` separators
/// and an empty cell reads as zero.
pub fn parse_allocations(
    data: &[u8],
    config: &LedgerConfig,
) -> DomainResult<BTreeMap<String, Allocation>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(data);
    let headers = reader
        .headers()
        .map_err(|e| DomainError::InvalidAllocations(e.to_string()))?
        .clone();

    let column = |label: &str| {
        headers
            .iter()
            .position(|h| h == label)
            .ok_or_else(|| DomainError::InvalidAllocations(format!("missing column {label:?}")))
    };
    let options = &config.csv_options;
    let submitted = column(&options.entity_package_submitted_label)?;
    let name_col = column(&options.entity_package_name_label)?;
    let kyc = column(&options.kyc_label)?;
    let funding = column(&options.funding_label)?;
    let account_columns: Vec<(&str, usize)> = config
        .accounts
        .iter()
        .filter(|(_, account)| !account.csv_label.is_empty())
        .filter_map(|(name, account)| {
            headers
                .iter()
                .position(|h| h == account.csv_label)
                .map(|index| (name.as_str(), index))
        })
        .collect();

    let mut allocations = BTreeMap::new();
    for (index, record) in reader.records().enumerate() {
        let row = index + 2;
        let record = record.map_err(|e| DomainError::InvalidAllocations(e.to_string()))?;
        let cell = |i: usize| record.get(i).unwrap_or("");

        if cell(submitted) != YES {
            continue;
        }
        let name = cell(name_col).trim().to_lowercase();
        if name.is_empty() {
            warn!("allocations row {}: blank entity name, skipping", row);
            continue;
        }

        let funds = if cell(kyc) == YES {
            parse_tokens(cell(funding), row)?
        } else {
            0
        };
        let mut delegations = BTreeMap::new();
        for (account, i) in &account_columns {
            delegations.insert((*account).to_string(), parse_tokens(cell(*i), row)?);
        }

        debug!("allocation: {} funds={} delegations={:?}", name, funds, delegations);
        if allocations
            .insert(name.clone(), Allocation { delegations, funds })
            .is_some()
        {
            return Err(DomainError::InvalidAllocations(format!(
                "row {row}: duplicate entity name {name:?}"
            )));
        }
    }
    Ok(allocations)
}

/// Whole-token amount such as `1,000,000`.
fn parse_tokens(cell: &str, row: usize) -> DomainResult<u64> {
    let digits: String = cell.chars().filter(|c| *c != ',').collect();
    let digits = digits.trim();
    if digits.is_empty() {
        return Ok(0);
    }
    digits.parse().map_err(|_| {
        DomainError::InvalidAllocations(format!("row {row}: invalid token amount {cell:?}"))
    })
}

// ============================================================
// Ledger accounting
// ============================================================

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct GeneralAccount {
    pub balance: Quantity,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SharePool {
    pub balance: Quantity,
    pub total_shares: Quantity,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CommissionRateStep {
    pub start: u64,
    pub rate: Quantity,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CommissionRateBoundStep {
    pub start: u64,
    pub rate_min: Quantity,
    pub rate_max: Quantity,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CommissionSchedule {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rates: Vec<CommissionRateStep>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bounds: Vec<CommissionRateBoundStep>,
}

impl CommissionSchedule {
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty() && self.bounds.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct EscrowAccount {
    pub active: SharePool,
    pub debonding: SharePool,
    #[serde(skip_serializing_if = "CommissionSchedule::is_empty")]
    pub commission_schedule: CommissionSchedule,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Account {
    pub general: GeneralAccount,
    pub escrow: EscrowAccount,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Delegation {
    pub shares: Quantity,
}

/// Delegations keyed by escrow (receiving) address, then delegator address.
pub type Delegations = BTreeMap<Address, BTreeMap<Address, Delegation>>;

/// Staking section of the genesis document.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StakingGenesis {
    /// Staking consensus parameters, passed through unchanged
    pub params: serde_json::Value,
    pub token_symbol: String,
    pub token_value_exponent: u8,
    pub total_supply: Quantity,
    pub common_pool: Quantity,
    pub ledger: BTreeMap<Address, Account>,
    pub delegations: Delegations,
}

/// Accounts and delegations with a running total of allocated base units.
#[derive(Debug, Clone)]
pub struct Ledger {
    precision: u128,
    total_supply: Quantity,
    commission_rate: Quantity,
    commission_rate_min: Quantity,
    commission_rate_max: Quantity,
    accounts: BTreeMap<Address, Account>,
    delegations: Delegations,
    total_allocated: Quantity,
}

impl Ledger {
    pub fn new(config: &LedgerConfig) -> DomainResult<Self> {
        let precision = config.precision()?;
        let mut ledger = Self {
            precision,
            total_supply: Quantity::ZERO,
            commission_rate: Quantity::new(config.commission_rate.into()),
            commission_rate_min: Quantity::new(config.commission_rate_min.into()),
            commission_rate_max: Quantity::new(config.commission_rate_max.into()),
            accounts: BTreeMap::new(),
            delegations: BTreeMap::new(),
            total_allocated: Quantity::ZERO,
        };
        ledger.total_supply = ledger.precise(config.total_supply)?;
        Ok(ledger)
    }

    fn precise(&self, tokens: u64) -> DomainResult<Quantity> {
        u128::from(tokens)
            .checked_mul(self.precision)
            .map(Quantity)
            .ok_or_else(|| ledger_error(format!("{tokens} tokens overflow the ledger")))
    }

    /// Open an account holding `tokens` in its general balance.
    pub fn add_account(&mut self, address: &Address, tokens: u64) -> DomainResult<()> {
        if self.accounts.contains_key(address) {
            return Err(ledger_error(format!("duplicate account found for \"{address}\"")));
        }
        let balance = self.precise(tokens)?;
        self.total_allocated = self.total_allocated.checked_add(balance)?;
        self.accounts.insert(
            address.clone(),
            Account {
                general: GeneralAccount { balance },
                ..Account::default()
            },
        );
        Ok(())
    }

    /// Move `tokens` from the general balance of `from` into the escrow of `to`.
    ///
    /// The receiving account gets the configured commission schedule.
    pub fn add_delegation(&mut self, from: &Address, to: &Address, tokens: u64) -> DomainResult<()> {
        let amount = self.precise(tokens)?;
        self.account_mut(from)?;
        self.account_mut(to)?;
        if self.delegation(from, to).is_some() {
            return Err(ledger_error(format!(
                "duplicate delegation from \"{from}\" to \"{to}\""
            )));
        }

        let source = self.account_mut(from)?;
        let balance = source.general.balance;
        source.general.balance = balance.checked_sub(amount).ok_or_else(|| {
            ledger_error(format!(
                "cannot delegate {amount} from \"{from}\": balance is {balance}"
            ))
        })?;

        let (rate, rate_min, rate_max) = (
            self.commission_rate,
            self.commission_rate_min,
            self.commission_rate_max,
        );
        let escrow = &mut self.account_mut(to)?.escrow;
        escrow.active.balance = escrow.active.balance.checked_add(amount)?;
        escrow.active.total_shares = escrow.active.total_shares.checked_add(amount)?;
        escrow.commission_schedule = CommissionSchedule {
            rates: vec![CommissionRateStep { start: 0, rate }],
            bounds: vec![CommissionRateBoundStep {
                start: 0,
                rate_min,
                rate_max,
            }],
        };

        self.delegations
            .entry(to.clone())
            .or_default()
            .insert(from.clone(), Delegation { shares: amount });
        Ok(())
    }

    fn account_mut(&mut self, address: &Address) -> DomainResult<&mut Account> {
        self.accounts.get_mut(address).ok_or_else(|| {
            ledger_error(format!("cannot delegate. account \"{address}\" does not exist"))
        })
    }

    pub fn account(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    pub fn delegation(&self, from: &Address, to: &Address) -> Option<&Delegation> {
        self.delegations.get(to).and_then(|d| d.get(from))
    }

    pub fn total_allocated(&self) -> Quantity {
        self.total_allocated
    }

    /// Whatever the accounts do not hold goes to the common pool.
    pub fn common_pool(&self) -> DomainResult<Quantity> {
        self.total_supply
            .checked_sub(self.total_allocated)
            .ok_or_else(|| {
                ledger_error(format!(
                    "allocated {} exceeds total supply {}",
                    self.total_allocated, self.total_supply
                ))
            })
    }

    pub fn into_genesis(
        self,
        params: serde_json::Value,
        token_symbol: &str,
        token_value_exponent: u8,
    ) -> DomainResult<StakingGenesis> {
        let common_pool = self.common_pool()?;
        Ok(StakingGenesis {
            params,
            token_symbol: token_symbol.to_string(),
            token_value_exponent,
            total_supply: self.total_supply,
            common_pool,
            ledger: self.accounts,
            delegations: self.delegations,
        })
    }
}

// ============================================================
// Building the ledger
// ============================================================

/// Build the ledger: configured accounts first, then every allocated entity.
///
/// `entities` maps lowercased package names to entity addresses. With
/// `test_only`, the config's test entities are applied on top; for an entity
/// already funded from the table only their delegations are added.
pub fn build_ledger(
    config: &LedgerConfig,
    allocations: &BTreeMap<String, Allocation>,
    entities: &BTreeMap<String, Address>,
    test_only: bool,
) -> DomainResult<Ledger> {
    let mut ledger = Ledger::new(config)?;
    for account in config.accounts.values() {
        ledger.add_account(&account.address, account.amount)?;
    }

    fund_entities(&mut ledger, config, allocations, entities)?;
    if test_only {
        fund_entities(&mut ledger, config, &config.test_only_entities, entities)?;
    }
    Ok(ledger)
}

fn fund_entities(
    ledger: &mut Ledger,
    config: &LedgerConfig,
    allocations: &BTreeMap<String, Allocation>,
    entities: &BTreeMap<String, Address>,
) -> DomainResult<()> {
    for (name, allocation) in allocations {
        let address = entities.get(name).ok_or_else(|| {
            ledger_error(format!(
                "account name \"{name}\" is missing from processed entity packages"
            ))
        })?;

        if ledger.account(address).is_none() || allocation.funds > 0 {
            ledger.add_account(address, allocation.funds)?;
            // Entities at or below the minimum balance do not self-stake.
            if allocation.funds > config.minimum_balance {
                ledger.add_delegation(address, address, allocation.funds - config.minimum_balance)?;
            }
        }

        for (account_name, &tokens) in &allocation.delegations {
            let account = config.accounts.get(account_name).ok_or_else(|| {
                ledger_error(format!("received unexpected account name {account_name}"))
            })?;
            if tokens == 0 {
                continue;
            }
            ledger.add_delegation(&account.address, address, tokens)?;
        }
    }
    Ok(())
}

fn ledger_error(message: String) -> DomainError {
    DomainError::Ledger(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
minimum_balance: 100
total_supply: 1000000
token_symbol: TEST
token_value_exponent: 3
commission_rate_max: 20000
commission_rate_min: 0
commission_rate: 5000
accounts:
  Foundation:
    amount: "10,000"
    address: oasis1qfoundation
    csv_label: Foundation Delegation
csv_options:
  kyc_label: KYC
  entity_package_submitted_label: Submitted
  entity_package_name_label: Name
  funding_label: Funding
"#;

    fn address(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    fn config() -> LedgerConfig {
        LedgerConfig::from_yaml(&CONFIG.replace("\"10,000\"", "\"10000\"")).unwrap()
    }

    #[test]
    fn given_quantity_when_serializing_then_decimal_string() {
        let json = serde_json::to_string(&Quantity::new(10u128.pow(28))).unwrap();

        assert_eq!(json, "\"10000000000000000000000000000\"");
    }

    #[test]
    fn given_yaml_when_loading_config_then_names_lowercased_and_amount_parsed() {
        let config = config();

        let account = &config.accounts["foundation"];
        assert_eq!(account.amount, 10_000);
        assert_eq!(account.address, address("oasis1qfoundation"));
        assert_eq!(config.precision().unwrap(), 1_000);
    }

    #[test]
    fn given_non_numeric_amount_when_loading_config_then_invalid_config() {
        let err = LedgerConfig::from_yaml(CONFIG).unwrap_err();

        assert!(matches!(err, DomainError::InvalidLedgerConfig(_)));
    }

    #[test]
    fn given_csv_when_parsing_allocations_then_applies_submission_and_kyc_rules() {
        let csv = "Name,Submitted,KYC,Funding,Foundation Delegation\n\
                   Alice,TRUE,TRUE,\"1,500\",200\n\
                   bob,TRUE,FALSE,900,\n\
                   carol,FALSE,TRUE,700,5\n\
                   ,TRUE,TRUE,1,1\n";

        let allocations = parse_allocations(csv.as_bytes(), &config()).unwrap();

        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations["alice"].funds, 1_500);
        assert_eq!(allocations["alice"].delegations["foundation"], 200);
        assert_eq!(allocations["bob"].funds, 0);
        assert_eq!(allocations["bob"].delegations["foundation"], 0);
    }

    #[test]
    fn given_missing_label_column_when_parsing_allocations_then_error() {
        let err = parse_allocations(b"Name,Submitted,Funding\n", &config()).unwrap_err();

        assert!(err.to_string().contains("missing column \"KYC\""));
    }

    #[test]
    fn given_garbage_amount_when_parsing_allocations_then_reports_row() {
        let csv = "Name,Submitted,KYC,Funding\nalice,TRUE,TRUE,lots\n";

        let err = parse_allocations(csv.as_bytes(), &config()).unwrap_err();

        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn given_duplicate_account_when_adding_then_error() {
        let mut ledger = Ledger::new(&config()).unwrap();
        ledger.add_account(&address("oasis1qa"), 1).unwrap();

        let err = ledger.add_account(&address("oasis1qa"), 1).unwrap_err();

        assert_eq!(
            err.to_string(),
            "staking ledger: duplicate account found for \"oasis1qa\""
        );
    }

    #[test]
    fn given_delegation_beyond_balance_when_delegating_then_error() {
        let mut ledger = Ledger::new(&config()).unwrap();
        ledger.add_account(&address("oasis1qa"), 5).unwrap();
        ledger.add_account(&address("oasis1qb"), 0).unwrap();

        let result = ledger.add_delegation(&address("oasis1qa"), &address("oasis1qb"), 6);

        assert!(matches!(result, Err(DomainError::Ledger(_))));
        assert!(ledger
            .delegation(&address("oasis1qa"), &address("oasis1qb"))
            .is_none());
    }

    #[test]
    fn given_unknown_delegator_when_delegating_then_error() {
        let mut ledger = Ledger::new(&config()).unwrap();
        ledger.add_account(&address("oasis1qb"), 0).unwrap();

        let err = ledger
            .add_delegation(&address("oasis1qghost"), &address("oasis1qb"), 1)
            .unwrap_err();

        assert!(err.to_string().contains("account \"oasis1qghost\" does not exist"));
    }

    #[test]
    fn given_delegation_when_delegating_then_escrow_and_commission_set() {
        let mut ledger = Ledger::new(&config()).unwrap();
        ledger.add_account(&address("oasis1qa"), 10).unwrap();
        ledger.add_account(&address("oasis1qb"), 0).unwrap();

        ledger
            .add_delegation(&address("oasis1qa"), &address("oasis1qb"), 4)
            .unwrap();

        let to = ledger.account(&address("oasis1qb")).unwrap();
        assert_eq!(to.escrow.active.balance, Quantity::new(4_000));
        assert_eq!(to.escrow.active.total_shares, Quantity::new(4_000));
        assert_eq!(to.escrow.commission_schedule.rates[0].rate, Quantity::new(5_000));
        assert_eq!(
            to.escrow.commission_schedule.bounds[0].rate_max,
            Quantity::new(20_000)
        );
        let from = ledger.account(&address("oasis1qa")).unwrap();
        assert_eq!(from.general.balance, Quantity::new(6_000));
        assert!(from.escrow.commission_schedule.is_empty());
        assert_eq!(ledger.total_allocated(), Quantity::new(10_000));
        assert_eq!(ledger.common_pool().unwrap(), Quantity::new(999_990_000));
    }

    #[test]
    fn given_allocation_for_unknown_entity_when_building_then_error() {
        let allocations = BTreeMap::from([("zed".to_string(), Allocation::default())]);

        let err = build_ledger(&config(), &allocations, &BTreeMap::new(), false).unwrap_err();

        assert!(err
            .to_string()
            .contains("account name \"zed\" is missing from processed entity packages"));
    }

    #[test]
    fn given_delegation_from_unknown_account_when_building_then_error() {
        let allocations = BTreeMap::from([(
            "alice".to_string(),
            Allocation {
                delegations: BTreeMap::from([("nobody".to_string(), 1)]),
                funds: 0,
            },
        )]);
        let entities = BTreeMap::from([("alice".to_string(), address("oasis1qalice"))]);

        let err = build_ledger(&config(), &allocations, &entities, false).unwrap_err();

        assert!(err.to_string().contains("received unexpected account name nobody"));
    }
}
