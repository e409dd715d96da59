//! Configuration loading and representation.
//!
//! Layered, lowest precedence first:
//! 1. Default values in code
//! 2. `config/stockbook.toml` (or the file named by `STOCKBOOK_CONFIG`), optional
//! 3. Environment variables with the `STOCKBOOK` prefix, `__` as separator
//!    (e.g. `STOCKBOOK__RECONCILIATION__EPSILON=0.05`)

use std::collections::BTreeMap;
use std::path::Path;

use config::{ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

use stockbook_accounting::{Account, AccountRole, InMemoryChartOfAccounts};
use stockbook_core::LocationId;
use stockbook_inventory::DocumentKind;
use stockbook_observability::LoggingConfig;

use crate::reconciliation::RepairStrategy;

const DEFAULT_CONFIG_FILE: &str = "config/stockbook";
const DEFAULT_EPSILON: &str = "0.01";
const DEFAULT_REFERENCE_WIDTH: usize = 6;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StockbookConfig {
    pub reconciliation: ReconciliationConfig,
    pub references: ReferenceConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    pub accounts: AccountsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationConfig {
    /// Differences at or below this are not discrepancies.
    pub epsilon: Decimal,
    /// Strategy used by `reconcile --repair` when none is given.
    pub strategy: RepairStrategy,
}

/// Reference-code prefixes and zero-pad width.
#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceConfig {
    pub width: usize,
    pub purchase: String,
    pub issue: String,
    pub consumption: String,
    pub disposal: String,
    pub adjustment: String,
    pub reconciliation: String,
}

impl ReferenceConfig {
    pub fn prefix(&self, kind: DocumentKind) -> &str {
        match kind {
            DocumentKind::Purchase => &self.purchase,
            DocumentKind::Issue => &self.issue,
            DocumentKind::Consumption => &self.consumption,
            DocumentKind::Disposal => &self.disposal,
            DocumentKind::Adjustment => &self.adjustment,
            DocumentKind::Reconciliation => &self.reconciliation,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutingConfig {
    /// Source for movements that name none; falls back to the first active
    /// warehouse when unset.
    #[serde(default)]
    pub default_warehouse: Option<LocationId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountConfig {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountsConfig {
    pub inventory_asset: AccountConfig,
    pub accounts_payable: AccountConfig,
    pub input_tax: AccountConfig,
    pub cost_of_goods_sold: AccountConfig,
    pub write_off: AccountConfig,
    pub stock_adjustment: AccountConfig,
    /// Department name → expense account.
    #[serde(default)]
    pub departments: BTreeMap<String, AccountConfig>,
}

impl AccountsConfig {
    fn for_role(&self, role: AccountRole) -> &AccountConfig {
        match role {
            AccountRole::InventoryAsset => &self.inventory_asset,
            AccountRole::AccountsPayable => &self.accounts_payable,
            AccountRole::InputTax => &self.input_tax,
            AccountRole::CostOfGoodsSold => &self.cost_of_goods_sold,
            AccountRole::WriteOff => &self.write_off,
            AccountRole::StockAdjustment => &self.stock_adjustment,
        }
    }

    /// Seed an in-memory chart of accounts from this section.
    pub fn chart(&self) -> InMemoryChartOfAccounts {
        let mut chart = InMemoryChartOfAccounts::new();
        for role in AccountRole::ALL {
            let cfg = self.for_role(role);
            chart = chart.with_role(role, Account::new(&cfg.code, &cfg.name, role.kind()));
        }
        for (department, cfg) in &self.departments {
            chart = chart.with_department(
                department,
                Account::new(
                    &cfg.code,
                    &cfg.name,
                    stockbook_accounting::AccountKind::Expense,
                ),
            );
        }
        chart
    }
}

impl StockbookConfig {
    /// Load configuration from files and environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("STOCKBOOK_CONFIG").ok();
        Self::load_from(path.as_deref().map(Path::new))
    }

    /// Load with an explicit config file (missing file is an error) or the
    /// default optional one.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config = config::Config::builder()
            // Start with default values
            .set_default("reconciliation.epsilon", DEFAULT_EPSILON)?
            .set_default("reconciliation.strategy", "adjust_ledger")?
            .set_default("references.width", DEFAULT_REFERENCE_WIDTH as i64)?
            .set_default("references.purchase", DocumentKind::Purchase.default_prefix())?
            .set_default("references.issue", DocumentKind::Issue.default_prefix())?
            .set_default("references.consumption", DocumentKind::Consumption.default_prefix())?
            .set_default("references.disposal", DocumentKind::Disposal.default_prefix())?
            .set_default("references.adjustment", DocumentKind::Adjustment.default_prefix())?
            .set_default(
                "references.reconciliation",
                DocumentKind::Reconciliation.default_prefix(),
            )?
            .set_default("accounts.inventory_asset.code", "1300")?
            .set_default("accounts.inventory_asset.name", "Inventory")?
            .set_default("accounts.input_tax.code", "1410")?
            .set_default("accounts.input_tax.name", "Input Tax Receivable")?
            .set_default("accounts.accounts_payable.code", "2100")?
            .set_default("accounts.accounts_payable.name", "Accounts Payable")?
            .set_default("accounts.cost_of_goods_sold.code", "5000")?
            .set_default("accounts.cost_of_goods_sold.name", "Cost of Goods Sold")?
            .set_default("accounts.write_off.code", "5400")?
            .set_default("accounts.write_off.name", "Inventory Write-off")?
            .set_default("accounts.stock_adjustment.code", "5410")?
            .set_default("accounts.stock_adjustment.name", "Stock Adjustment")?
            .set_default("logging.level", "info")?
            .set_default("logging.json", true)?
            .add_source(file)
            // Override with environment variables (STOCKBOOK__ prefix)
            .add_source(
                Environment::with_prefix("STOCKBOOK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

fn account(code: &str, name: &str) -> AccountConfig {
    AccountConfig {
        code: code.to_string(),
        name: name.to_string(),
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            epsilon: Decimal::new(1, 2),
            strategy: RepairStrategy::AdjustLedger,
        }
    }
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_REFERENCE_WIDTH,
            purchase: DocumentKind::Purchase.default_prefix().to_string(),
            issue: DocumentKind::Issue.default_prefix().to_string(),
            consumption: DocumentKind::Consumption.default_prefix().to_string(),
            disposal: DocumentKind::Disposal.default_prefix().to_string(),
            adjustment: DocumentKind::Adjustment.default_prefix().to_string(),
            reconciliation: DocumentKind::Reconciliation.default_prefix().to_string(),
        }
    }
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            inventory_asset: account("1300", "Inventory"),
            accounts_payable: account("2100", "Accounts Payable"),
            input_tax: account("1410", "Input Tax Receivable"),
            cost_of_goods_sold: account("5000", "Cost of Goods Sold"),
            write_off: account("5400", "Inventory Write-off"),
            stock_adjustment: account("5410", "Stock Adjustment"),
            departments: BTreeMap::new(),
        }
    }
}
