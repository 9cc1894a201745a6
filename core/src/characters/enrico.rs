//! Data source

use cbd_conditions::ConditionSet;
use cbd_pre::PublicKey;

use crate::error::Result;
use crate::kits::message_kit::MessageKit;

/// Encrypts under a policy key, optionally binding a default condition set
#[derive(Debug, Clone)]
pub struct Enrico {
    policy_encrypting_key: PublicKey,
    conditions: Option<ConditionSet>,
}

impl Enrico {
    pub fn new(policy_encrypting_key: PublicKey) -> Self {
        Self {
            policy_encrypting_key,
            conditions: None,
        }
    }

    pub fn with_conditions(mut self, conditions: ConditionSet) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn policy_encrypting_key(&self) -> &PublicKey {
        &self.policy_encrypting_key
    }

    pub fn conditions(&self) -> Option<&ConditionSet> {
        self.conditions.as_ref()
    }

    /// Encrypt `plaintext`. An explicit `conditions` argument replaces the
    /// default set for this message only.
    pub fn encrypt_message(
        &self,
        plaintext: &[u8],
        conditions: Option<ConditionSet>,
    ) -> Result<MessageKit> {
        let conditions = conditions.or_else(|| self.conditions.clone());
        MessageKit::new(&self.policy_encrypting_key, plaintext, conditions)
    }
}
