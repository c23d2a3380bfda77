//! Redemption proofs - rolling HMAC codes scanned at the counter.
//!
//! The counter display polls [`RedemptionVerifier::generate`] and shows the
//! current proof; a member's scan sends it back through
//! [`RedemptionVerifier::verify`]. Proofs are `HMAC-SHA256(secret, block)`
//! over 30-second time blocks; verification accepts the current and the
//! previous block to tolerate clock and display lag, which also bounds replay
//! to under a minute. The verifier never touches money: a valid proof only
//! flips today's `BOOKED` token for the slot currently being served to
//! `REDEEMED`.

use crate::{
    core::calendar::Calendar,
    core::token::{find_token_on, reload},
    entities::{MealToken, TokenStatus, meal_token},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sea_orm::{DatabaseConnection, Set, TransactionTrait, prelude::*};
use sha2::Sha256;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Length of one proof time block.
const BLOCK_SECS: i64 = 30;

/// A proof string together with the instant it stops being the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedProof {
    /// Lowercase hex HMAC of the current time block
    pub proof: String,
    /// Hard expiry of this proof as the *current* code; a poller should
    /// refresh exactly then. The verifier still accepts it for one further
    /// block.
    pub expires_at: DateTime<Utc>,
}

/// Issues and checks time-windowed redemption proofs against one shared
/// secret.
pub struct RedemptionVerifier {
    mac: HmacSha256,
    calendar: Calendar,
}

// Manual impl: deriving Debug would print the HMAC key state
impl std::fmt::Debug for RedemptionVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedemptionVerifier")
            .field("calendar", &self.calendar)
            .finish_non_exhaustive()
    }
}

impl RedemptionVerifier {
    /// Creates a verifier over the given shared secret.
    ///
    /// An absent or empty secret is a server-configuration error: both the
    /// issuing and the verifying side would otherwise silently agree on a
    /// trivial key.
    pub fn new(secret: &[u8], calendar: Calendar) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::ServerMisconfiguration {
                message: "redemption secret is empty".to_string(),
            });
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|e| Error::ServerMisconfiguration {
            message: format!("redemption secret rejected: {e}"),
        })?;
        Ok(Self { mac, calendar })
    }

    /// Creates a verifier from the `REDEMPTION_SECRET` environment variable.
    pub fn from_env(calendar: Calendar) -> Result<Self> {
        let secret = crate::config::redemption_secret()?;
        Self::new(&secret, calendar)
    }

    /// The proof for the current instant, plus when it lapses.
    pub fn generate(&self) -> GeneratedProof {
        self.generate_at(Utc::now())
    }

    fn generate_at(&self, now: DateTime<Utc>) -> GeneratedProof {
        let block = block_of(now);
        let expiry_secs = (block + 1) * BLOCK_SECS;
        let expires_at = DateTime::from_timestamp(expiry_secs, 0).unwrap_or(now);
        GeneratedProof {
            proof: self.proof_for_block(block),
            expires_at,
        }
    }

    fn proof_for_block(&self, block: i64) -> String {
        let mut mac = self.mac.clone();
        mac.update(&block.to_be_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Validates a scanned proof and redeems the member's token for the slot
    /// currently being served.
    ///
    /// The slot is resolved from the wall clock, not from which token the
    /// member intends to redeem; near a slot boundary this can redeem the
    /// wrong slot's token. Known ambiguity, kept pending product
    /// clarification.
    ///
    /// The lookup and the `BOOKED -> REDEEMED` transition are atomic: of two
    /// concurrent scans of the same valid proof, exactly one redeems and the
    /// other is told the token is already used.
    pub async fn verify(
        &self,
        db: &DatabaseConnection,
        proof: &str,
        member_id: i64,
    ) -> Result<meal_token::Model> {
        self.verify_at(db, proof, member_id, Utc::now()).await
    }

    async fn verify_at(
        &self,
        db: &DatabaseConnection,
        proof: &str,
        member_id: i64,
        now: DateTime<Utc>,
    ) -> Result<meal_token::Model> {
        let block = block_of(now);
        let accepted =
            proof == self.proof_for_block(block) || proof == self.proof_for_block(block - 1);
        if !accepted {
            warn!(member_id, "rejected stale or forged redemption proof");
            return Err(Error::Forbidden {
                message: "invalid or expired redemption proof".to_string(),
            });
        }

        let slot = self.calendar.slot_for(now);
        let today = self.calendar.today(now);

        let txn = db.begin().await?;

        let token = find_token_on(&txn, member_id, today, slot)
            .await?
            .ok_or_else(|| Error::NotFound {
                what: format!("booked {slot} for today"),
            })?;

        match token.status {
            TokenStatus::Cancelled | TokenStatus::Expired => {
                return Err(Error::NotFound {
                    what: format!("booked {slot} for today"),
                });
            }
            TokenStatus::Redeemed => {
                return Err(Error::Conflict {
                    message: format!("{slot} token already used"),
                });
            }
            TokenStatus::Booked => {}
        }

        let update = MealToken::update_many()
            .set(meal_token::ActiveModel {
                status: Set(TokenStatus::Redeemed),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(meal_token::Column::Id.eq(token.id))
            .filter(meal_token::Column::Status.eq(TokenStatus::Booked))
            .exec(&txn)
            .await?;

        if update.rows_affected == 0 {
            // Lost the race to a concurrent scan
            return Err(Error::Conflict {
                message: format!("{slot} token already used"),
            });
        }

        let token = reload(&txn, token.id).await?;
        txn.commit().await?;

        info!(member_id, token_id = token.id, %slot, "redeemed meal token");

        Ok(token)
    }
}

fn block_of(now: DateTime<Utc>) -> i64 {
    now.timestamp().div_euclid(BLOCK_SECS)
}
