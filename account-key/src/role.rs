//! Roles a role-based key can authorize.

use {
    num_enum::{IntoPrimitive, TryFromPrimitive},
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// The purpose a signature set is checked for.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    IntoPrimitive,
    TryFromPrimitive,
)]
#[repr(u8)]
pub enum RoleType {
    /// Signing ordinary transactions as sender.
    Transaction = 0,
    /// Signing account-update transactions.
    AccountUpdate = 1,
    /// Signing as fee payer of a fee-delegated transaction.
    FeePayer = 2,
}

impl RoleType {
    /// Number of roles; the maximum slot count of a role-based key.
    pub const COUNT: usize = 3;

    pub const ALL: [RoleType; 3] = [
        RoleType::Transaction,
        RoleType::AccountUpdate,
        RoleType::FeePayer,
    ];

    pub fn index(self) -> usize {
        u8::from(self) as usize
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleType::Transaction => write!(f, "RoleTransaction"),
            RoleType::AccountUpdate => write!(f, "RoleAccountUpdate"),
            RoleType::FeePayer => write!(f, "RoleFeePayer"),
        }
    }
}
