use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use stockbook_core::{DomainError, DomainResult};

/// High-level account kind (determines normal balance side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

/// Account identifier + metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub code: String, // e.g. "1300"
    pub name: String, // e.g. "Inventory"
    pub kind: AccountKind,
}

impl Account {
    pub fn new(code: impl Into<String>, name: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            kind,
        }
    }
}

/// The part an account plays in stock postings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    InventoryAsset,
    AccountsPayable,
    InputTax,
    CostOfGoodsSold,
    WriteOff,
    StockAdjustment,
}

impl AccountRole {
    pub const ALL: [AccountRole; 6] = [
        AccountRole::InventoryAsset,
        AccountRole::AccountsPayable,
        AccountRole::InputTax,
        AccountRole::CostOfGoodsSold,
        AccountRole::WriteOff,
        AccountRole::StockAdjustment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AccountRole::InventoryAsset => "inventory_asset",
            AccountRole::AccountsPayable => "accounts_payable",
            AccountRole::InputTax => "input_tax",
            AccountRole::CostOfGoodsSold => "cost_of_goods_sold",
            AccountRole::WriteOff => "write_off",
            AccountRole::StockAdjustment => "stock_adjustment",
        }
    }

    /// Kind an account in this role is expected to have.
    pub fn kind(self) -> AccountKind {
        match self {
            AccountRole::InventoryAsset | AccountRole::InputTax => AccountKind::Asset,
            AccountRole::AccountsPayable => AccountKind::Liability,
            AccountRole::CostOfGoodsSold | AccountRole::WriteOff | AccountRole::StockAdjustment => {
                AccountKind::Expense
            }
        }
    }
}

/// Chart-of-accounts lookup.
///
/// Postings never create accounts; a missing one is a `NotFound` error that
/// aborts the unit of work.
pub trait ChartOfAccounts: Send + Sync {
    fn account_for(&self, role: AccountRole) -> DomainResult<Account>;

    /// Expense account of a consuming department (housekeeping, kitchen, ...).
    fn department_expense(&self, department: &str) -> DomainResult<Account>;
}

impl<C> ChartOfAccounts for Arc<C>
where
    C: ChartOfAccounts + ?Sized,
{
    fn account_for(&self, role: AccountRole) -> DomainResult<Account> {
        (**self).account_for(role)
    }

    fn department_expense(&self, department: &str) -> DomainResult<Account> {
        (**self).department_expense(department)
    }
}

/// Chart of accounts held in memory, seeded from configuration.
#[derive(Debug, Clone, Default)]
pub struct InMemoryChartOfAccounts {
    roles: BTreeMap<AccountRole, Account>,
    departments: BTreeMap<String, Account>,
}

impl InMemoryChartOfAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// A small hospitality chart covering every role.
    pub fn standard() -> Self {
        Self::new()
            .with_role(
                AccountRole::InventoryAsset,
                Account::new("1300", "Inventory", AccountKind::Asset),
            )
            .with_role(
                AccountRole::InputTax,
                Account::new("1410", "Input Tax Receivable", AccountKind::Asset),
            )
            .with_role(
                AccountRole::AccountsPayable,
                Account::new("2100", "Accounts Payable", AccountKind::Liability),
            )
            .with_role(
                AccountRole::CostOfGoodsSold,
                Account::new("5000", "Cost of Goods Sold", AccountKind::Expense),
            )
            .with_role(
                AccountRole::WriteOff,
                Account::new("5400", "Inventory Write-off", AccountKind::Expense),
            )
            .with_role(
                AccountRole::StockAdjustment,
                Account::new("5410", "Stock Adjustment", AccountKind::Expense),
            )
    }

    pub fn with_role(mut self, role: AccountRole, account: Account) -> Self {
        self.roles.insert(role, account);
        self
    }

    pub fn with_department(mut self, department: impl Into<String>, account: Account) -> Self {
        self.departments
            .insert(department.into().to_lowercase(), account);
        self
    }

    pub fn without_role(mut self, role: AccountRole) -> Self {
        self.roles.remove(&role);
        self
    }
}

impl ChartOfAccounts for InMemoryChartOfAccounts {
    fn account_for(&self, role: AccountRole) -> DomainResult<Account> {
        self.roles
            .get(&role)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("account for role {}", role.as_str())))
    }

    fn department_expense(&self, department: &str) -> DomainResult<Account> {
        self.departments
            .get(&department.to_lowercase())
            .cloned()
            .ok_or_else(|| {
                DomainError::not_found(format!("expense account for department {department}"))
            })
    }
}
