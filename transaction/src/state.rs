//! The account state a transaction is validated and executed against.

use {
    parking_lot::RwLock,
    ranger_account_key::AccountKey,
    ranger_primitives::Address,
    std::collections::HashMap,
};

/// One account as seen by validation and execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    pub nonce: u64,
    pub balance: u128,
    pub key: AccountKey,
    /// Present for program (contract) accounts.
    pub code: Option<Vec<u8>>,
}

impl Account {
    pub fn is_program(&self) -> bool {
        self.code.is_some()
    }
}

/// Read access to account state.
pub trait StateReader: Send + Sync {
    /// `None` if the account has never been created or touched.
    fn account(&self, address: &Address) -> Option<Account>;

    fn exists(&self, address: &Address) -> bool {
        self.account(address).is_some()
    }

    fn nonce(&self, address: &Address) -> u64 {
        self.account(address).map_or(0, |a| a.nonce)
    }

    fn balance(&self, address: &Address) -> u128 {
        self.account(address).map_or(0, |a| a.balance)
    }

    /// Accounts that were never created carry a legacy key.
    fn account_key(&self, address: &Address) -> AccountKey {
        self.account(address).map(|a| a.key).unwrap_or_default()
    }

    fn is_program_account(&self, address: &Address) -> bool {
        self.account(address).is_some_and(|a| a.is_program())
    }
}

/// Shared state read under its lock, so pools can validate against state
/// that block processing keeps updating.
impl<S: StateReader> StateReader for RwLock<S> {
    fn account(&self, address: &Address) -> Option<Account> {
        self.read().account(address)
    }
}

/// Mutable account state with revertible snapshots.
pub trait StateWriter: StateReader {
    /// Insert or replace the account at `address`.
    fn set_account(&mut self, address: Address, account: Account);

    /// Take a snapshot to roll back to.
    fn snapshot(&mut self) -> usize;

    /// Discard every change made after `snapshot` was taken.
    fn revert_to_snapshot(&mut self, snapshot: usize);

    fn update_account(&mut self, address: &Address, f: &mut dyn FnMut(&mut Account)) {
        let mut account = self.account(address).unwrap_or_default();
        f(&mut account);
        self.set_account(*address, account);
    }

    fn add_balance(&mut self, address: &Address, amount: u128) {
        self.update_account(address, &mut |a| a.balance = a.balance.saturating_add(amount));
    }

    /// Returns false, leaving the balance untouched, if it is too small.
    fn sub_balance(&mut self, address: &Address, amount: u128) -> bool {
        if self.balance(address) < amount {
            return false;
        }
        self.update_account(address, &mut |a| a.balance = a.balance.saturating_sub(amount));
        true
    }

    fn increment_nonce(&mut self, address: &Address) {
        self.update_account(address, &mut |a| a.nonce = a.nonce.saturating_add(1));
    }
}

/// In-memory account state.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    accounts: HashMap<Address, Account>,
    snapshots: Vec<HashMap<Address, Account>>,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(mut self, address: Address, balance: u128) -> Self {
        self.update_account(&address, &mut |a| a.balance = balance);
        self
    }

    pub fn with_account(mut self, address: Address, account: Account) -> Self {
        self.set_account(address, account);
        self
    }
}

impl StateReader for MemoryState {
    fn account(&self, address: &Address) -> Option<Account> {
        self.accounts.get(address).cloned()
    }
}

impl StateWriter for MemoryState {
    fn set_account(&mut self, address: Address, account: Account) {
        self.accounts.insert(address, account);
    }

    fn snapshot(&mut self) -> usize {
        self.snapshots.push(self.accounts.clone());
        self.snapshots.len().saturating_sub(1)
    }

    fn revert_to_snapshot(&mut self, snapshot: usize) {
        if snapshot < self.snapshots.len() {
            self.snapshots.truncate(snapshot.saturating_add(1));
            if let Some(accounts) = self.snapshots.pop() {
                self.accounts = accounts;
            }
        }
    }
}
