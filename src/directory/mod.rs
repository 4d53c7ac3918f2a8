//! Account Directory
//!
//! Resolves a receiver identifier (IPA address, mobile number, card, raw
//! account key or IBAN) to a concrete bank account, and picks the sender's
//! funding account. Lookups only; nothing here mutates state.
//!
//! When a user or bank customer owns several candidates and no default is set,
//! the first one by creation order wins.

mod types;

pub use types::{FundingSource, Recipient, TransferMethod};

use std::sync::Arc;

use crate::core_types::{AccountKey, UserId};
use crate::credentials::AuthContext;
use crate::error::TransferError;
use crate::models::{BankAccount, InstantPaymentAddress, UserProfile};
use crate::store::DirectoryStore;

/// A resolved receiver
#[derive(Debug, Clone)]
pub struct ResolvedAccount {
    pub account: BankAccount,
    /// Owner of the IPA through which the account was reached, if any
    pub owner: Option<UserProfile>,
}

/// The sender's paying account plus where the PIN is checked
#[derive(Debug, Clone)]
pub struct FundingAccount {
    pub account: BankAccount,
    pub auth: AuthContext,
    /// Set when the sender authenticates with an IPA
    pub ipa_address: Option<String>,
}

pub struct AccountDirectory {
    store: Arc<dyn DirectoryStore>,
}

impl AccountDirectory {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }

    /// Resolve a receiver identifier to its account key
    pub async fn resolve(&self, recipient: &Recipient) -> Result<AccountKey, TransferError> {
        Ok(self.resolve_recipient(recipient).await?.account.key)
    }

    /// Resolve a receiver identifier to its account and owning user
    pub async fn resolve_recipient(
        &self,
        recipient: &Recipient,
    ) -> Result<ResolvedAccount, TransferError> {
        recipient.validate()?;

        match recipient {
            Recipient::Account(key) => {
                let account = self
                    .store
                    .account(key)
                    .await?
                    .ok_or_else(|| not_found(recipient))?;
                let owner = self.owner_of(&account.key).await?;
                Ok(ResolvedAccount { account, owner })
            }
            Recipient::Iban { iban } => {
                let account = self
                    .store
                    .account_by_iban(iban.trim())
                    .await?
                    .ok_or_else(|| not_found(recipient))?;
                let owner = self.owner_of(&account.key).await?;
                Ok(ResolvedAccount { account, owner })
            }
            Recipient::Ipa { address } => {
                let ipa = self
                    .store
                    .ipa_by_address(address.trim())
                    .await?
                    .ok_or_else(|| not_found(recipient))?;
                self.account_behind_ipa(&ipa, recipient).await
            }
            Recipient::Mobile { phone } => {
                let user = self
                    .store
                    .user_by_phone(phone.trim())
                    .await?
                    .ok_or_else(|| not_found(recipient))?;
                let ipa = self
                    .default_ipa(&user)
                    .await?
                    .ok_or_else(|| not_found(recipient))?;
                self.account_behind_ipa(&ipa, recipient).await
            }
            Recipient::Card {
                bank_id,
                card_number,
            } => {
                let card = self
                    .store
                    .card(*bank_id, card_number.trim())
                    .await?
                    .ok_or_else(|| not_found(recipient))?;
                let account = self
                    .store
                    .accounts_for_bank_user(card.bank_user_id, card.bank_id)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| not_found(recipient))?;
                let owner = self.owner_of(&account.key).await?;
                Ok(ResolvedAccount { account, owner })
            }
        }
    }

    /// Pick the sender's paying account and authentication context
    pub async fn resolve_funding_source(
        &self,
        sender: &UserProfile,
        source: Option<&FundingSource>,
    ) -> Result<FundingAccount, TransferError> {
        match source {
            None => {
                let ipa = self.default_ipa(sender).await?.ok_or_else(|| {
                    TransferError::SenderAccountNotFound(format!(
                        "user {} has no payment address",
                        sender.user_id
                    ))
                })?;
                self.funding_via_ipa(ipa).await
            }
            Some(FundingSource::Ipa { address }) => {
                let ipa = self
                    .store
                    .ipa_by_address(address.trim())
                    .await?
                    .ok_or_else(|| {
                        TransferError::SenderAccountNotFound(format!("ipa {}", address))
                    })?;
                if ipa.user_id != sender.user_id {
                    return Err(TransferError::Forbidden(
                        "payment address does not belong to the sender".into(),
                    ));
                }
                self.funding_via_ipa(ipa).await
            }
            Some(FundingSource::Account(key)) => {
                let account = self.store.account(key).await?.ok_or_else(|| {
                    TransferError::SenderAccountNotFound(format!("account {}", key))
                })?;
                let ipa = self.sender_ipa_on(&account.key, sender.user_id).await?;
                Ok(FundingAccount {
                    account,
                    auth: AuthContext::Ipa {
                        address: ipa.ipa_address.clone(),
                    },
                    ipa_address: Some(ipa.ipa_address),
                })
            }
            Some(FundingSource::Card {
                bank_id,
                card_number,
            }) => {
                let card = self
                    .store
                    .card(*bank_id, card_number.trim())
                    .await?
                    .ok_or_else(|| {
                        TransferError::SenderAccountNotFound(format!(
                            "card {}/{}",
                            bank_id, card_number
                        ))
                    })?;
                let account = self
                    .store
                    .accounts_for_bank_user(card.bank_user_id, card.bank_id)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| {
                        TransferError::SenderAccountNotFound(format!(
                            "no account behind card {}/{}",
                            bank_id, card_number
                        ))
                    })?;
                // the card must pay from an account the sender has linked
                self.sender_ipa_on(&account.key, sender.user_id).await?;
                Ok(FundingAccount {
                    account,
                    auth: AuthContext::Card {
                        bank_id: card.bank_id,
                        card_number: card.card_number,
                    },
                    ipa_address: None,
                })
            }
        }
    }

    /// The user's default IPA, else their first IPA by creation order
    pub async fn default_ipa(
        &self,
        user: &UserProfile,
    ) -> Result<Option<InstantPaymentAddress>, TransferError> {
        if let Some(ipa_id) = user.default_account
            && let Some(ipa) = self.store.ipa_by_id(ipa_id).await?
        {
            return Ok(Some(ipa));
        }
        Ok(self.store.ipas_for_user(user.user_id).await?.into_iter().next())
    }

    /// The user owning the first IPA attached to an account
    pub async fn owner_of(&self, key: &AccountKey) -> Result<Option<UserProfile>, TransferError> {
        match self.store.ipas_for_account(key).await?.into_iter().next() {
            Some(ipa) => self.store.user(ipa.user_id).await,
            None => Ok(None),
        }
    }

    pub async fn user(&self, user_id: UserId) -> Result<UserProfile, TransferError> {
        self.store
            .user(user_id)
            .await?
            .ok_or_else(|| TransferError::Validation(format!("user {} not found", user_id)))
    }

    pub async fn ipa(&self, address: &str) -> Result<Option<InstantPaymentAddress>, TransferError> {
        self.store.ipa_by_address(address.trim()).await
    }

    async fn account_behind_ipa(
        &self,
        ipa: &InstantPaymentAddress,
        recipient: &Recipient,
    ) -> Result<ResolvedAccount, TransferError> {
        let account = self
            .store
            .account(&ipa.key)
            .await?
            .ok_or_else(|| not_found(recipient))?;
        let owner = self.store.user(ipa.user_id).await?;
        Ok(ResolvedAccount { account, owner })
    }

    async fn funding_via_ipa(
        &self,
        ipa: InstantPaymentAddress,
    ) -> Result<FundingAccount, TransferError> {
        let account = self.store.account(&ipa.key).await?.ok_or_else(|| {
            TransferError::SenderAccountNotFound(format!("account {}", ipa.key))
        })?;
        Ok(FundingAccount {
            account,
            auth: AuthContext::Ipa {
                address: ipa.ipa_address.clone(),
            },
            ipa_address: Some(ipa.ipa_address),
        })
    }

    async fn sender_ipa_on(
        &self,
        key: &AccountKey,
        user_id: UserId,
    ) -> Result<InstantPaymentAddress, TransferError> {
        self.store
            .ipas_for_account(key)
            .await?
            .into_iter()
            .find(|ipa| ipa.user_id == user_id)
            .ok_or_else(|| {
                TransferError::Forbidden(format!("account {} is not linked to the sender", key))
            })
    }
}

fn not_found(recipient: &Recipient) -> TransferError {
    TransferError::RecipientNotFound(recipient.to_string())
}
