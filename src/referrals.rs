use std::fmt;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, Result, ValidationError};
use crate::models::Referral;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferralStatus {
    Pending,
    SignedUp,
    Subscribed,
}

impl fmt::Display for ReferralStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReferralStatus::Pending => "pending",
            ReferralStatus::SignedUp => "signed up",
            ReferralStatus::Subscribed => "subscribed",
        };
        f.write_str(label)
    }
}

impl Referral {
    /// Read from the progress timestamps; there is no stored status column.
    pub fn status(&self) -> ReferralStatus {
        if self.subscribed_at.is_some() {
            ReferralStatus::Subscribed
        } else if self.signed_up_at.is_some() {
            ReferralStatus::SignedUp
        } else {
            ReferralStatus::Pending
        }
    }
}

pub fn create_referral<S: Store>(store: &mut S, email: &str, now: DateTime<Utc>) -> Result<Referral> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(ValidationError::MissingField("Referred email").into());
    }
    if !email.contains('@') {
        return Err(ValidationError::InvalidEmail(email).into());
    }
    if store
        .list::<Referral>()?
        .iter()
        .any(|referral| referral.referred_email == email)
    {
        return Err(ValidationError::Rejected(format!("{email} has already been referred.")).into());
    }

    let referral = Referral {
        id: Uuid::new_v4(),
        user_id: store.user_id(),
        referred_email: email,
        created_at: now,
        signed_up_at: None,
        subscribed_at: None,
        reward_granted: false,
    };
    store.insert(&referral)?;
    info!(email = %referral.referred_email, "created referral");
    Ok(referral)
}

pub fn list_referrals<S: Store>(store: &S) -> Result<Vec<Referral>> {
    let mut referrals = store.list::<Referral>()?;
    referrals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(referrals)
}

pub fn find_referral<S: Store>(store: &S, reference: &str) -> Result<Referral> {
    let reference = reference.trim();
    let id = Uuid::parse_str(reference).ok();
    store
        .list::<Referral>()?
        .into_iter()
        .find(|referral| {
            Some(referral.id) == id || referral.referred_email.eq_ignore_ascii_case(reference)
        })
        .ok_or_else(|| AppError::not_found("Referral", reference))
}

pub fn record_sign_up<S: Store>(store: &mut S, id: Uuid, now: DateTime<Utc>) -> Result<Referral> {
    transition(store, id, ReferralStatus::Pending, |referral| {
        referral.signed_up_at = Some(now);
    })
}

pub fn record_subscription<S: Store>(store: &mut S, id: Uuid, now: DateTime<Utc>) -> Result<Referral> {
    transition(store, id, ReferralStatus::SignedUp, |referral| {
        referral.subscribed_at = Some(now);
    })
}

pub fn grant_reward<S: Store>(store: &mut S, id: Uuid) -> Result<Referral> {
    let referral = get_referral(store, id)?;
    if referral.reward_granted {
        return Err(ValidationError::InvalidTransition(format!(
            "Reward for {} was already granted.",
            referral.referred_email
        ))
        .into());
    }
    transition(store, id, ReferralStatus::Subscribed, |referral| {
        referral.reward_granted = true;
    })
}

fn transition<S: Store>(
    store: &mut S,
    id: Uuid,
    required: ReferralStatus,
    apply: impl FnOnce(&mut Referral),
) -> Result<Referral> {
    let mut referral = get_referral(store, id)?;
    let current = referral.status();
    if current != required {
        return Err(ValidationError::InvalidTransition(format!(
            "Referral for {} is {current}; expected {required}.",
            referral.referred_email
        ))
        .into());
    }
    apply(&mut referral);
    store.update(&referral)?;
    info!(email = %referral.referred_email, status = %referral.status(), "updated referral");
    Ok(referral)
}

fn get_referral<S: Store>(store: &S, id: Uuid) -> Result<Referral> {
    store
        .get::<Referral>(id)?
        .ok_or_else(|| AppError::not_found("Referral", id))
}
