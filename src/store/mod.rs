//! SQLite persistence for subscriptions, promo codes, API usage and the
//! founders program. Single connection behind a mutex; the write volume
//! here is tiny compared to the analysis path.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;
use uuid::Uuid;

use crate::util;

pub const FOUNDER_CAP: i64 = 100;
pub const GENESIS_10_CAP: i64 = 10;
const FOUNDER_LIFETIME_MS: i64 = 100 * 365 * 24 * 60 * 60 * 1000;
const THIRTY_DAYS_MS: i64 = 30 * 24 * 60 * 60 * 1000;
const SCOUT_EXPIRES_AT: i64 = 9_999_999_999_999;

const API_KEY_PREFIX: &str = "sg_";

/// Friends-and-family codes seeded on first open. 90 days of pro, one
/// use each.
const FF_CODES: [&str; 20] = [
    "SG-B8UK5ILU", "SG-D5FKT83Y", "SG-J3H2ZIRX", "SG-ZNG01TRV", "SG-E15I1NAD",
    "SG-CSMNWJ8Q", "SG-VK4NK60X", "SG-89599Z1I", "SG-5KPE1GUQ", "SG-M790M4BY",
    "SG-Z0AAWH7E", "SG-1CTN5ZKX", "SG-BZGL7LIO", "SG-D0R7IJOD", "SG-9MI8H4B6",
    "SG-KJD5O1TO", "SG-ICGF1ADP", "SG-H24EU1GO", "SG-3SGU7G2N", "SG-B34VFPD8",
];

#[derive(Debug)]
pub enum StoreError {
    Db(rusqlite::Error),
    /// Business-rule rejection carrying a user-facing message.
    Rejected(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Db(e) => write!(f, "database error: {e}"),
            StoreError::Rejected(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Db(e)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub id: i64,
    pub address: String,
    pub email: Option<String>,
    pub api_key: String,
    pub plan: String,
    pub paid_tx_hash: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub paid_at: i64,
    pub expires_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Subscription {
    pub fn is_active(&self, now_ms: i64) -> bool {
        self.expires_at > now_ms
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PromoCode {
    pub code: String,
    pub plan: String,
    pub duration_days: i64,
    pub max_uses: i64,
    pub used_count: i64,
    pub created_at: i64,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Founder {
    pub id: i64,
    pub founder_number: i64,
    pub address: String,
    pub display_name: Option<String>,
    pub twitter_handle: Option<String>,
    pub moltbook_username: Option<String>,
    pub nft_minted: bool,
    pub nft_tx_hash: Option<String>,
    pub qualified_at: i64,
    pub is_genesis_10: bool,
    pub umbra_allocated: i64,
    pub umbra_claimed: i64,
    pub referral_code: Option<String>,
    pub created_at: i64,
}

/// Roster entry exposed publicly; omits payment linkage.
#[derive(Debug, Clone, Serialize)]
pub struct FounderListing {
    pub founder_number: i64,
    pub address: String,
    pub display_name: Option<String>,
    pub twitter_handle: Option<String>,
    pub moltbook_username: Option<String>,
    pub is_genesis_10: bool,
    pub nft_minted: bool,
    pub qualified_at: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FounderProgress {
    pub address: String,
    pub account_created_at: Option<i64>,
    pub safe_configured: bool,
    pub safe_address: Option<String>,
    pub txs_analyzed: i64,
    pub first_analysis_at: Option<i64>,
    pub days_active: i64,
    pub fast_tracked: bool,
    pub qualified: bool,
    pub qualified_at: Option<i64>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FounderStatus {
    pub total: i64,
    pub remaining: i64,
    pub cap: i64,
    pub genesis10_remaining: i64,
    pub closed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ActivateSubscription {
    pub address: String,
    pub email: Option<String>,
    pub paid_tx_hash: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub plan: Option<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activation {
    pub api_key: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    pub safe_configured: Option<bool>,
    pub safe_address: Option<String>,
    pub txs_analyzed: Option<i64>,
    pub days_active: Option<i64>,
    pub fast_tracked: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ClaimFounderSpot {
    pub address: String,
    pub display_name: Option<String>,
    pub tx_hash: Option<String>,
    pub fast_track: bool,
}

#[derive(Debug, Clone)]
pub struct PlanLimits {
    pub safes: u32,
    pub daily_api_calls: u32,
    pub features: &'static [&'static str],
}

/// Per-plan entitlements. Unknown plans fall back to scout.
pub fn plan_limits(plan: &str) -> PlanLimits {
    match plan {
        "pro" => PlanLimits {
            safes: 5,
            daily_api_calls: 1000,
            features: &["decode", "simulate", "risk", "explain", "alerts"],
        },
        "founder" => PlanLimits {
            safes: 10,
            daily_api_calls: 5000,
            features: &[
                "decode",
                "simulate",
                "risk",
                "explain",
                "alerts",
                "early_access",
                "governance",
            ],
        },
        _ => PlanLimits {
            safes: 1,
            daily_api_calls: 10,
            features: &["decode"],
        },
    }
}

fn generate_api_key() -> String {
    format!("{API_KEY_PREFIX}{}", Uuid::new_v4().simple())
}

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(include_str!("../../migrations/001_init.sql"))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.seed_ff_codes()?;
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn seed_ff_codes(&self) -> Result<(), StoreError> {
        for code in FF_CODES {
            self.create_promo_code(code, 90, 1, "pro")?;
        }
        Ok(())
    }

    // ── Subscriptions ──────────────────────────────────────────────

    /// Create or renew a subscription. An existing row keeps its API
    /// key and payment linkage; plan and expiry are replaced.
    pub fn activate_subscription(
        &self,
        opts: &ActivateSubscription,
    ) -> Result<Activation, StoreError> {
        let conn = self.lock();
        activate_on(&conn, opts)
    }

    pub fn subscription_by_address(
        &self,
        address: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        self.query_subscription(
            "SELECT * FROM subscriptions WHERE address = ?1",
            &address.to_lowercase(),
        )
    }

    pub fn subscription_by_api_key(
        &self,
        api_key: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        self.query_subscription("SELECT * FROM subscriptions WHERE api_key = ?1", api_key)
    }

    pub fn subscription_by_email(&self, email: &str) -> Result<Option<Subscription>, StoreError> {
        self.query_subscription(
            "SELECT * FROM subscriptions WHERE email = ?1",
            &email.to_lowercase(),
        )
    }

    pub fn subscription_by_stripe_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        self.query_subscription(
            "SELECT * FROM subscriptions WHERE stripe_customer_id = ?1",
            customer_id,
        )
    }

    pub fn subscription_by_stripe_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        self.query_subscription(
            "SELECT * FROM subscriptions WHERE stripe_subscription_id = ?1",
            subscription_id,
        )
    }

    fn query_subscription(
        &self,
        sql: &str,
        param: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(sql, params![param], subscription_from_row)
            .optional()?;
        Ok(row)
    }

    /// Expire a subscription immediately when Stripe cancels it.
    pub fn deactivate_by_stripe_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<(), StoreError> {
        let now = util::now_ms();
        let conn = self.lock();
        conn.execute(
            "UPDATE subscriptions SET expires_at = ?1, updated_at = ?2 WHERE stripe_subscription_id = ?3",
            params![now, now, subscription_id],
        )?;
        Ok(())
    }

    pub fn log_api_usage(
        &self,
        api_key: &str,
        endpoint: &str,
        response_ms: Option<i64>,
    ) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO api_usage (api_key, endpoint, timestamp, response_ms) VALUES (?1, ?2, ?3, ?4)",
            params![api_key, endpoint, util::now_ms(), response_ms],
        )?;
        Ok(())
    }

    pub fn api_usage_count(&self, api_key: &str, since_ms: i64) -> Result<i64, StoreError> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM api_usage WHERE api_key = ?1 AND timestamp > ?2",
            params![api_key, since_ms],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn all_active_subscriptions(&self) -> Result<Vec<Subscription>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT * FROM subscriptions WHERE expires_at > ?1")?;
        let rows = stmt
            .query_map(params![util::now_ms()], subscription_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Free scout tier. Returns the existing key when the address
    /// already has an active or scout subscription.
    pub fn create_free_subscription(&self, address: &str) -> Result<(String, String), StoreError> {
        let addr = address.to_lowercase();
        let conn = self.lock();
        let existing = conn
            .query_row(
                "SELECT * FROM subscriptions WHERE address = ?1",
                params![addr],
                subscription_from_row,
            )
            .optional()?;
        if let Some(sub) = existing {
            if sub.expires_at > util::now_ms() || sub.plan == "scout" {
                return Ok((sub.api_key, sub.plan));
            }
        }

        let api_key = generate_api_key();
        let now = util::now_ms();
        conn.execute(
            "INSERT INTO subscriptions (address, email, api_key, plan, paid_tx_hash, stripe_customer_id, stripe_subscription_id, paid_at, expires_at, updated_at)
             VALUES (?1, NULL, ?2, 'scout', 'free:scout', NULL, NULL, ?3, ?4, ?3)
             ON CONFLICT(address) DO UPDATE SET
               api_key = excluded.api_key,
               plan = excluded.plan,
               paid_tx_hash = COALESCE(excluded.paid_tx_hash, paid_tx_hash),
               paid_at = excluded.paid_at,
               expires_at = excluded.expires_at,
               updated_at = excluded.updated_at",
            params![addr, api_key, now, SCOUT_EXPIRES_AT],
        )?;
        Ok((api_key, "scout".to_string()))
    }

    // ── Promo codes ────────────────────────────────────────────────

    pub fn create_promo_code(
        &self,
        code: &str,
        duration_days: i64,
        max_uses: i64,
        plan: &str,
    ) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO promo_codes (code, plan, duration_days, max_uses) VALUES (?1, ?2, ?3, ?4)",
            params![code, plan, duration_days, max_uses],
        )?;
        Ok(())
    }

    pub fn all_promo_codes(&self) -> Result<Vec<PromoCode>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT * FROM promo_codes ORDER BY created_at DESC")?;
        let rows = stmt
            .query_map([], promo_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Redeem a code for the given address and activate the plan it
    /// carries. One redemption per address per code.
    pub fn redeem_promo_code(&self, code: &str, address: &str) -> Result<Activation, StoreError> {
        let addr = address.to_lowercase();
        let conn = self.lock();

        let promo = conn
            .query_row(
                "SELECT * FROM promo_codes WHERE code = ?1 AND active = 1",
                params![code],
                promo_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::Rejected("Invalid or expired promo code".to_string()))?;
        if promo.used_count >= promo.max_uses {
            return Err(StoreError::Rejected(
                "Promo code has been fully redeemed".to_string(),
            ));
        }
        let already: Option<i64> = conn
            .query_row(
                "SELECT id FROM promo_redemptions WHERE code = ?1 AND address = ?2",
                params![code, addr],
                |row| row.get(0),
            )
            .optional()?;
        if already.is_some() {
            return Err(StoreError::Rejected(
                "You have already redeemed this code".to_string(),
            ));
        }

        let activation = activate_on(
            &conn,
            &ActivateSubscription {
                address: addr.clone(),
                plan: Some(promo.plan.clone()),
                paid_tx_hash: Some(format!("promo:{code}")),
                duration_ms: Some(promo.duration_days * 24 * 60 * 60 * 1000),
                ..Default::default()
            },
        )?;

        conn.execute(
            "UPDATE promo_codes SET used_count = used_count + 1 WHERE code = ?1",
            params![code],
        )?;
        conn.execute(
            "INSERT INTO promo_redemptions (code, address, redeemed_at) VALUES (?1, ?2, ?3)",
            params![code, addr, util::now_ms()],
        )?;
        info!(code, address = %addr, "promo code redeemed");
        Ok(activation)
    }

    // ── Founders program ───────────────────────────────────────────

    pub fn founder_status(&self) -> Result<FounderStatus, StoreError> {
        let conn = self.lock();
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM founders", [], |row| row.get(0))?;
        let genesis10: i64 = conn.query_row(
            "SELECT COUNT(*) FROM founders WHERE is_genesis_10 = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(FounderStatus {
            total,
            remaining: (FOUNDER_CAP - total).max(0),
            cap: FOUNDER_CAP,
            genesis10_remaining: (GENESIS_10_CAP - genesis10).max(0),
            closed: total >= FOUNDER_CAP,
        })
    }

    pub fn founder_by_address(&self, address: &str) -> Result<Option<Founder>, StoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT * FROM founders WHERE address = ?1",
                params![address.to_lowercase()],
                founder_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn founder_by_number(&self, number: i64) -> Result<Option<Founder>, StoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT * FROM founders WHERE founder_number = ?1",
                params![number],
                founder_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn all_founders(&self) -> Result<Vec<FounderListing>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT founder_number, address, display_name, twitter_handle, moltbook_username,
                    is_genesis_10, nft_minted, qualified_at, created_at
             FROM founders ORDER BY founder_number ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(FounderListing {
                    founder_number: row.get(0)?,
                    address: row.get(1)?,
                    display_name: row.get(2)?,
                    twitter_handle: row.get(3)?,
                    moltbook_username: row.get(4)?,
                    is_genesis_10: row.get::<_, i64>(5)? != 0,
                    nft_minted: row.get::<_, i64>(6)? != 0,
                    qualified_at: row.get(7)?,
                    created_at: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn founder_progress(&self, address: &str) -> Result<Option<FounderProgress>, StoreError> {
        let conn = self.lock();
        progress_on(&conn, &address.to_lowercase())
    }

    /// Merge a partial update into the progress row and re-evaluate
    /// qualification. Qualification is sticky once earned.
    pub fn update_founder_progress(
        &self,
        address: &str,
        updates: &ProgressUpdate,
    ) -> Result<FounderProgress, StoreError> {
        let conn = self.lock();
        update_progress_on(&conn, &address.to_lowercase(), updates)
    }

    /// Assign the next founder number and activate the lifetime
    /// subscription atomically.
    pub fn claim_founder_spot(
        &self,
        opts: &ClaimFounderSpot,
    ) -> Result<(Founder, String), StoreError> {
        let addr = opts.address.to_lowercase();
        let conn = self.lock();

        let existing = conn
            .query_row(
                "SELECT * FROM founders WHERE address = ?1",
                params![addr],
                founder_from_row,
            )
            .optional()?;
        if let Some(founder) = existing {
            return Err(StoreError::Rejected(format!(
                "Already a founder (#{})",
                founder.founder_number
            )));
        }

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM founders", [], |row| row.get(0))?;
        if total >= FOUNDER_CAP {
            return Err(StoreError::Rejected(
                "The Founders Program is closed. All 100 spots have been claimed.".to_string(),
            ));
        }

        if opts.fast_track && opts.tx_hash.is_some() {
            update_progress_on(
                &conn,
                &addr,
                &ProgressUpdate {
                    fast_tracked: Some(true),
                    ..Default::default()
                },
            )?;
        }

        let qualified = progress_on(&conn, &addr)?
            .map(|p| p.qualified)
            .unwrap_or(false);
        if !qualified {
            return Err(StoreError::Rejected(
                "Not yet qualified. Configure a Safe, analyze 3 transactions, and stay active for 7 days — or pay $20 for instant qualification."
                    .to_string(),
            ));
        }

        let tx = conn.unchecked_transaction()?;
        let next: i64 = tx.query_row(
            "SELECT COALESCE(MAX(founder_number), 0) + 1 FROM founders",
            [],
            |row| row.get(0),
        )?;
        if next > FOUNDER_CAP {
            return Err(StoreError::Rejected(
                "The Founders Program is closed. All 100 spots have been claimed.".to_string(),
            ));
        }

        let now = util::now_ms();
        let is_genesis_10 = next <= GENESIS_10_CAP;
        let umbra_allocation: i64 = if is_genesis_10 { 100_000 } else { 50_000 };
        tx.execute(
            "INSERT INTO founders (founder_number, address, display_name, qualified_at, is_genesis_10, umbra_allocated, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                next,
                addr,
                opts.display_name,
                now,
                is_genesis_10 as i64,
                umbra_allocation,
                now
            ],
        )?;
        let activation = activate_on(
            &tx,
            &ActivateSubscription {
                address: addr.clone(),
                plan: Some("founder".to_string()),
                paid_tx_hash: Some(
                    opts.tx_hash
                        .clone()
                        .unwrap_or_else(|| format!("founder:{next}")),
                ),
                duration_ms: Some(FOUNDER_LIFETIME_MS),
                ..Default::default()
            },
        )?;
        tx.commit()?;

        info!(founder_number = next, address = %addr, "founder spot claimed");
        let founder = conn.query_row(
            "SELECT * FROM founders WHERE address = ?1",
            params![addr],
            founder_from_row,
        )?;
        Ok((founder, activation.api_key))
    }

    /// Returns false when the number/address pair matches no founder.
    pub fn update_founder_profile(
        &self,
        founder_number: i64,
        address: &str,
        display_name: Option<&str>,
        twitter_handle: Option<&str>,
        moltbook_username: Option<&str>,
    ) -> Result<bool, StoreError> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE founders SET display_name = ?1, twitter_handle = ?2, moltbook_username = ?3
             WHERE founder_number = ?4 AND address = ?5",
            params![
                display_name,
                twitter_handle,
                moltbook_username,
                founder_number,
                address.to_lowercase()
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn update_founder_nft(
        &self,
        founder_number: i64,
        nft_tx_hash: &str,
    ) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "UPDATE founders SET nft_minted = 1, nft_tx_hash = ?1 WHERE founder_number = ?2",
            params![nft_tx_hash, founder_number],
        )?;
        Ok(())
    }
}

fn activate_on(conn: &Connection, opts: &ActivateSubscription) -> Result<Activation, StoreError> {
    let addr = opts.address.to_lowercase();
    let now = util::now_ms();
    let duration = opts.duration_ms.unwrap_or(THIRTY_DAYS_MS);
    let expires_at = now + duration;

    let existing_key: Option<String> = conn
        .query_row(
            "SELECT api_key FROM subscriptions WHERE address = ?1",
            params![addr],
            |row| row.get(0),
        )
        .optional()?;
    let api_key = existing_key.unwrap_or_else(generate_api_key);
    let plan = opts.plan.as_deref().unwrap_or("pro");

    conn.execute(
        "INSERT INTO subscriptions (address, email, api_key, plan, paid_tx_hash, stripe_customer_id, stripe_subscription_id, paid_at, expires_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?8)
         ON CONFLICT(address) DO UPDATE SET
           api_key = excluded.api_key,
           plan = excluded.plan,
           paid_tx_hash = COALESCE(excluded.paid_tx_hash, paid_tx_hash),
           stripe_customer_id = COALESCE(excluded.stripe_customer_id, stripe_customer_id),
           stripe_subscription_id = COALESCE(excluded.stripe_subscription_id, stripe_subscription_id),
           paid_at = excluded.paid_at,
           expires_at = excluded.expires_at,
           updated_at = excluded.updated_at",
        params![
            addr,
            opts.email,
            api_key,
            plan,
            opts.paid_tx_hash,
            opts.stripe_customer_id,
            opts.stripe_subscription_id,
            now,
            expires_at
        ],
    )?;

    Ok(Activation {
        api_key,
        expires_at,
    })
}

fn progress_on(conn: &Connection, addr: &str) -> Result<Option<FounderProgress>, StoreError> {
    let row = conn
        .query_row(
            "SELECT * FROM founder_progress WHERE address = ?1",
            params![addr],
            progress_from_row,
        )
        .optional()?;
    Ok(row)
}

fn update_progress_on(
    conn: &Connection,
    addr: &str,
    updates: &ProgressUpdate,
) -> Result<FounderProgress, StoreError> {
    let existing = progress_on(conn, addr)?;
    let now = util::now_ms();

    let account_created_at = existing
        .as_ref()
        .and_then(|p| p.account_created_at)
        .unwrap_or(now);
    let safe_configured = updates
        .safe_configured
        .unwrap_or_else(|| existing.as_ref().map(|p| p.safe_configured).unwrap_or(false));
    let safe_address = updates
        .safe_address
        .clone()
        .or_else(|| existing.as_ref().and_then(|p| p.safe_address.clone()));
    let txs_analyzed = updates
        .txs_analyzed
        .unwrap_or_else(|| existing.as_ref().map(|p| p.txs_analyzed).unwrap_or(0));
    let first_analysis_at = existing
        .as_ref()
        .and_then(|p| p.first_analysis_at)
        .or(if updates.txs_analyzed.unwrap_or(0) > 0 {
            Some(now)
        } else {
            None
        });
    let days_active = updates
        .days_active
        .unwrap_or_else(|| existing.as_ref().map(|p| p.days_active).unwrap_or(0));
    let fast_tracked = updates
        .fast_tracked
        .unwrap_or_else(|| existing.as_ref().map(|p| p.fast_tracked).unwrap_or(false));

    let mut qualified = existing.as_ref().map(|p| p.qualified).unwrap_or(false);
    let mut qualified_at = existing.as_ref().and_then(|p| p.qualified_at);
    if !qualified && safe_configured && txs_analyzed >= 3 && (days_active >= 7 || fast_tracked) {
        qualified = true;
        qualified_at = Some(now);
    }

    conn.execute(
        "INSERT INTO founder_progress (address, account_created_at, safe_configured, safe_address, txs_analyzed, first_analysis_at, days_active, fast_tracked, qualified, qualified_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(address) DO UPDATE SET
           safe_configured = excluded.safe_configured,
           safe_address = COALESCE(excluded.safe_address, safe_address),
           txs_analyzed = excluded.txs_analyzed,
           first_analysis_at = COALESCE(excluded.first_analysis_at, first_analysis_at),
           days_active = excluded.days_active,
           fast_tracked = excluded.fast_tracked,
           qualified = excluded.qualified,
           qualified_at = COALESCE(excluded.qualified_at, qualified_at),
           updated_at = excluded.updated_at",
        params![
            addr,
            account_created_at,
            safe_configured as i64,
            safe_address,
            txs_analyzed,
            first_analysis_at,
            days_active,
            fast_tracked as i64,
            qualified as i64,
            qualified_at,
            now
        ],
    )?;

    progress_on(conn, addr)?.ok_or_else(|| {
        StoreError::Db(rusqlite::Error::QueryReturnedNoRows)
    })
}

fn subscription_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        id: row.get("id")?,
        address: row.get("address")?,
        email: row.get("email")?,
        api_key: row.get("api_key")?,
        plan: row.get("plan")?,
        paid_tx_hash: row.get("paid_tx_hash")?,
        stripe_customer_id: row.get("stripe_customer_id")?,
        stripe_subscription_id: row.get("stripe_subscription_id")?,
        paid_at: row.get("paid_at")?,
        expires_at: row.get("expires_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn promo_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PromoCode> {
    Ok(PromoCode {
        code: row.get("code")?,
        plan: row.get("plan")?,
        duration_days: row.get("duration_days")?,
        max_uses: row.get("max_uses")?,
        used_count: row.get("used_count")?,
        created_at: row.get("created_at")?,
        active: row.get::<_, i64>("active")? != 0,
    })
}

fn founder_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Founder> {
    Ok(Founder {
        id: row.get("id")?,
        founder_number: row.get("founder_number")?,
        address: row.get("address")?,
        display_name: row.get("display_name")?,
        twitter_handle: row.get("twitter_handle")?,
        moltbook_username: row.get("moltbook_username")?,
        nft_minted: row.get::<_, i64>("nft_minted")? != 0,
        nft_tx_hash: row.get("nft_tx_hash")?,
        qualified_at: row.get("qualified_at")?,
        is_genesis_10: row.get::<_, i64>("is_genesis_10")? != 0,
        umbra_allocated: row.get("umbra_allocated")?,
        umbra_claimed: row.get("umbra_claimed")?,
        referral_code: row.get("referral_code")?,
        created_at: row.get("created_at")?,
    })
}

fn progress_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FounderProgress> {
    Ok(FounderProgress {
        address: row.get("address")?,
        account_created_at: row.get("account_created_at")?,
        safe_configured: row.get::<_, i64>("safe_configured")? != 0,
        safe_address: row.get("safe_address")?,
        txs_analyzed: row.get("txs_analyzed")?,
        first_analysis_at: row.get("first_analysis_at")?,
        days_active: row.get("days_active")?,
        fast_tracked: row.get::<_, i64>("fast_tracked")? != 0,
        qualified: row.get::<_, i64>("qualified")? != 0,
        qualified_at: row.get("qualified_at")?,
        updated_at: row.get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        Store::in_memory().unwrap()
    }

    #[test]
    fn activation_creates_and_renews_with_same_key() {
        let s = store();
        let first = s
            .activate_subscription(&ActivateSubscription {
                address: "0xABCD000000000000000000000000000000000001".to_string(),
                paid_tx_hash: Some("0xdeadbeef".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert!(first.api_key.starts_with("sg_"));
        assert_eq!(first.api_key.len(), 35);

        let renewed = s
            .activate_subscription(&ActivateSubscription {
                address: "0xabcd000000000000000000000000000000000001".to_string(),
                plan: Some("founder".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(renewed.api_key, first.api_key);

        let sub = s
            .subscription_by_address("0xABCD000000000000000000000000000000000001")
            .unwrap()
            .unwrap();
        assert_eq!(sub.plan, "founder");
        // paid_tx_hash survives a renewal that omits it
        assert_eq!(sub.paid_tx_hash.as_deref(), Some("0xdeadbeef"));
    }

    #[test]
    fn free_tier_returns_existing_key() {
        let s = store();
        let (key1, plan) = s.create_free_subscription("0xAA00000000000000000000000000000000000001").unwrap();
        assert_eq!(plan, "scout");
        let (key2, _) = s.create_free_subscription("0xaa00000000000000000000000000000000000001").unwrap();
        assert_eq!(key1, key2);
        let sub = s
            .subscription_by_api_key(&key1)
            .unwrap()
            .unwrap();
        assert_eq!(sub.paid_tx_hash.as_deref(), Some("free:scout"));
        assert_eq!(sub.expires_at, 9_999_999_999_999);
    }

    #[test]
    fn promo_redemption_enforces_limits() {
        let s = store();
        let addr_a = "0xA000000000000000000000000000000000000001";
        let addr_b = "0xB000000000000000000000000000000000000002";

        let err = s.redeem_promo_code("NOPE-123", addr_a).unwrap_err();
        assert_eq!(err.to_string(), "Invalid or expired promo code");

        let activation = s.redeem_promo_code("SG-B8UK5ILU", addr_a).unwrap();
        assert!(activation.api_key.starts_with("sg_"));
        let sub = s.subscription_by_address(addr_a).unwrap().unwrap();
        assert_eq!(sub.plan, "pro");
        assert_eq!(sub.paid_tx_hash.as_deref(), Some("promo:SG-B8UK5ILU"));

        let err = s.redeem_promo_code("SG-B8UK5ILU", addr_a).unwrap_err();
        assert_eq!(err.to_string(), "Promo code has been fully redeemed");

        // max_uses exhausted before the duplicate-address check runs
        let err = s.redeem_promo_code("SG-B8UK5ILU", addr_b).unwrap_err();
        assert_eq!(err.to_string(), "Promo code has been fully redeemed");
    }

    #[test]
    fn promo_duplicate_address_rejected_when_multi_use() {
        let s = store();
        s.create_promo_code("TEAM-CODE", 30, 5, "pro").unwrap();
        let addr = "0xC000000000000000000000000000000000000003";
        s.redeem_promo_code("TEAM-CODE", addr).unwrap();
        let err = s.redeem_promo_code("TEAM-CODE", addr).unwrap_err();
        assert_eq!(err.to_string(), "You have already redeemed this code");
    }

    #[test]
    fn seeds_friends_and_family_codes_once() {
        let s = store();
        let codes = s.all_promo_codes().unwrap();
        assert_eq!(codes.len(), 20);
        assert!(codes.iter().all(|c| c.plan == "pro" && c.max_uses == 1));
    }

    #[test]
    fn progress_qualification_rules() {
        let s = store();
        let addr = "0xD000000000000000000000000000000000000004";

        let p = s
            .update_founder_progress(
                addr,
                &ProgressUpdate {
                    safe_configured: Some(true),
                    txs_analyzed: Some(3),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!p.qualified, "needs 7 days or a fast track");

        let p = s
            .update_founder_progress(
                addr,
                &ProgressUpdate {
                    days_active: Some(7),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(p.qualified);
        assert!(p.qualified_at.is_some());
        // sticky once earned
        let p = s
            .update_founder_progress(
                addr,
                &ProgressUpdate {
                    txs_analyzed: Some(0),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(p.qualified);
    }

    #[test]
    fn fast_track_substitutes_for_days_active() {
        let s = store();
        let addr = "0xE000000000000000000000000000000000000005";
        let p = s
            .update_founder_progress(
                addr,
                &ProgressUpdate {
                    safe_configured: Some(true),
                    txs_analyzed: Some(5),
                    fast_tracked: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(p.qualified);
    }

    #[test]
    fn founder_claim_assigns_numbers_and_genesis_allocation() {
        let s = store();
        let addr = "0xF000000000000000000000000000000000000006";

        let err = s
            .claim_founder_spot(&ClaimFounderSpot {
                address: addr.to_string(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(err.to_string().starts_with("Not yet qualified."));

        let (founder, api_key) = s
            .claim_founder_spot(&ClaimFounderSpot {
                address: addr.to_string(),
                display_name: Some("alice".to_string()),
                tx_hash: Some("0xpaid".to_string()),
                fast_track: true,
            })
            .unwrap();
        assert_eq!(founder.founder_number, 1);
        assert!(founder.is_genesis_10);
        assert_eq!(founder.umbra_allocated, 100_000);
        assert!(api_key.starts_with("sg_"));

        let sub = s.subscription_by_address(addr).unwrap().unwrap();
        assert_eq!(sub.plan, "founder");
        assert_eq!(sub.paid_tx_hash.as_deref(), Some("0xpaid"));

        let err = s
            .claim_founder_spot(&ClaimFounderSpot {
                address: addr.to_string(),
                fast_track: true,
                tx_hash: Some("0xagain".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "Already a founder (#1)");

        let status = s.founder_status().unwrap();
        assert_eq!(status.total, 1);
        assert_eq!(status.remaining, 99);
        assert_eq!(status.genesis10_remaining, 9);
        assert!(!status.closed);
    }

    #[test]
    fn fast_track_without_progress_qualifies_nobody_without_txs() {
        let s = store();
        // fast track alone is not enough; the safe and analysis
        // requirements still apply
        let err = s
            .claim_founder_spot(&ClaimFounderSpot {
                address: "0x1100000000000000000000000000000000000007".to_string(),
                tx_hash: Some("0xpaid".to_string()),
                fast_track: true,
                ..Default::default()
            })
            .unwrap_err();
        assert!(err.to_string().starts_with("Not yet qualified."));
    }

    #[test]
    fn founder_profile_updates_require_matching_pair() {
        let s = store();
        let addr = "0x2200000000000000000000000000000000000008";
        s.update_founder_progress(
            addr,
            &ProgressUpdate {
                safe_configured: Some(true),
                txs_analyzed: Some(3),
                fast_tracked: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        s.claim_founder_spot(&ClaimFounderSpot {
            address: addr.to_string(),
            ..Default::default()
        })
        .unwrap();

        assert!(s
            .update_founder_profile(1, addr, Some("bob"), Some("@bob"), None)
            .unwrap());
        assert!(!s
            .update_founder_profile(1, "0x3300000000000000000000000000000000000009", Some("eve"), None, None)
            .unwrap());

        let founder = s.founder_by_number(1).unwrap().unwrap();
        assert_eq!(founder.display_name.as_deref(), Some("bob"));

        s.update_founder_nft(1, "0xminted").unwrap();
        let founder = s.founder_by_address(addr).unwrap().unwrap();
        assert!(founder.nft_minted);
        assert_eq!(founder.nft_tx_hash.as_deref(), Some("0xminted"));
    }

    #[test]
    fn usage_logging_counts_since_cutoff() {
        let s = store();
        s.log_api_usage("sg_test", "/api/decode", Some(12)).unwrap();
        s.log_api_usage("sg_test", "/api/risk", None).unwrap();
        s.log_api_usage("sg_other", "/api/decode", None).unwrap();
        assert_eq!(s.api_usage_count("sg_test", 0).unwrap(), 2);
        assert_eq!(s.api_usage_count("sg_test", util::now_ms() + 1).unwrap(), 0);
    }
}
