//! PortfolioState - process-wide reservations and session counters
//!
//! Shared by the scheduler and every position task through an `Arc`. All
//! access goes through short critical sections; no lock is held across an
//! await point.

use crate::domain::services::risk_metrics::ExposureRisk;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Margin committed to one symbol
#[derive(Debug, Clone, Copy)]
struct Commitment {
    size_pct: f64,
    leverage: u32,
}

#[derive(Debug)]
struct PortfolioInner {
    reserved: HashMap<String, Commitment>,
    /// Symbols whose close failed; presumed still open on the exchange
    stranded: HashMap<String, Commitment>,
    trade_count: u32,
    /// Dispatched entries counted against the trade cap but not yet filled
    pending_entries: u32,
    consecutive_losses: u32,
    cumulative_realized_pnl: f64,
    wins: u32,
    losses: u32,
    session_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSnapshot {
    pub reserved: Vec<String>,
    pub stranded: Vec<String>,
    pub exposure_pct: f64,
    pub trade_count: u32,
    pub pending_entries: u32,
    pub consecutive_losses: u32,
    pub cumulative_realized_pnl: f64,
    pub wins: u32,
    pub losses: u32,
    pub session_date: NaiveDate,
}

#[derive(Debug)]
pub struct PortfolioState {
    inner: Mutex<PortfolioInner>,
}

impl Default for PortfolioState {
    fn default() -> Self {
        Self::new()
    }
}

impl PortfolioState {
    pub fn new() -> Self {
        Self::starting_on(Utc::now().date_naive())
    }

    pub fn starting_on(session_date: NaiveDate) -> Self {
        Self {
            inner: Mutex::new(PortfolioInner {
                reserved: HashMap::new(),
                stranded: HashMap::new(),
                trade_count: 0,
                pending_entries: 0,
                consecutive_losses: 0,
                cumulative_realized_pnl: 0.0,
                wins: 0,
                losses: 0,
                session_date,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PortfolioInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn exposure(inner: &PortfolioInner) -> f64 {
        inner
            .reserved
            .values()
            .chain(inner.stranded.values())
            .map(|c| c.size_pct)
            .sum()
    }

    /// Atomically reserve `symbol` for one position.
    ///
    /// Returns None if the symbol is already reserved or stranded. The
    /// reservation is released when the returned guard is dropped.
    pub fn try_reserve(
        self: &Arc<Self>,
        symbol: &str,
        size_pct: f64,
        leverage: u32,
    ) -> Option<SymbolReservation> {
        let mut inner = self.lock();
        if inner.reserved.contains_key(symbol) || inner.stranded.contains_key(symbol) {
            debug!(symbol, "Reservation refused");
            return None;
        }
        inner.reserved.insert(
            symbol.to_string(),
            Commitment {
                size_pct: size_pct.max(0.0),
                leverage,
            },
        );
        Some(SymbolReservation {
            state: Arc::clone(self),
            symbol: symbol.to_string(),
            active: true,
            trade_claimed: false,
        })
    }

    fn release(&self, symbol: &str) {
        if self.lock().reserved.remove(symbol).is_some() {
            debug!(symbol, "Reservation released");
        }
    }

    fn strand(&self, symbol: &str) {
        let mut inner = self.lock();
        let commitment = inner.reserved.remove(symbol).unwrap_or(Commitment {
            size_pct: 0.0,
            leverage: 1,
        });
        inner.stranded.insert(symbol.to_string(), commitment);
    }

    pub fn is_reserved(&self, symbol: &str) -> bool {
        self.lock().reserved.contains_key(symbol)
    }

    pub fn is_stranded(&self, symbol: &str) -> bool {
        self.lock().stranded.contains_key(symbol)
    }

    /// True when the symbol can be scanned for a new entry
    pub fn is_available(&self, symbol: &str) -> bool {
        let inner = self.lock();
        !inner.reserved.contains_key(symbol) && !inner.stranded.contains_key(symbol)
    }

    /// Operator acknowledgement that a stranded position was dealt with
    pub fn clear_stranded(&self, symbol: &str) -> bool {
        let cleared = self.lock().stranded.remove(symbol).is_some();
        if cleared {
            info!(symbol, "Stranded symbol cleared");
        }
        cleared
    }

    pub fn open_count(&self) -> usize {
        self.lock().reserved.len()
    }

    /// Reserved plus stranded size, in percent of balance
    pub fn current_exposure_pct(&self) -> f64 {
        Self::exposure(&self.lock())
    }

    /// Risk level of everything reserved or stranded
    pub fn exposure_risk(&self) -> ExposureRisk {
        let inner = self.lock();
        let commitments: Vec<(f64, u32)> = inner
            .reserved
            .values()
            .chain(inner.stranded.values())
            .map(|c| (c.size_pct, c.leverage))
            .collect();
        ExposureRisk::assess(&commitments)
    }

    pub fn record_entry(&self) -> u32 {
        self.settle_entry(false)
    }

    fn settle_entry(&self, claimed: bool) -> u32 {
        let mut inner = self.lock();
        if claimed {
            inner.pending_entries = inner.pending_entries.saturating_sub(1);
        }
        inner.trade_count += 1;
        inner.trade_count
    }

    /// Count one more entry against `cap` before it is placed.
    /// Fails once filled plus pending entries reach the cap.
    fn claim_trade(&self, cap: u32) -> bool {
        let mut inner = self.lock();
        if inner.trade_count + inner.pending_entries >= cap {
            return false;
        }
        inner.pending_entries += 1;
        true
    }

    fn drop_trade_claim(&self) {
        let mut inner = self.lock();
        inner.pending_entries = inner.pending_entries.saturating_sub(1);
    }

    /// Filled entries plus dispatched ones still entering
    pub fn committed_trades(&self) -> u32 {
        let inner = self.lock();
        inner.trade_count + inner.pending_entries
    }

    pub fn record_close(&self, realized_pnl: f64) {
        let mut inner = self.lock();
        inner.cumulative_realized_pnl += realized_pnl;
        if realized_pnl < 0.0 {
            inner.losses += 1;
            inner.consecutive_losses += 1;
        } else {
            inner.wins += 1;
            inner.consecutive_losses = 0;
        }
    }

    pub fn trade_count(&self) -> u32 {
        self.lock().trade_count
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.lock().consecutive_losses
    }

    pub fn cumulative_realized_pnl(&self) -> f64 {
        self.lock().cumulative_realized_pnl
    }

    /// Trade and consecutive-loss counters restart; cumulative P&L is kept
    pub fn reset_session_counters(&self) {
        let mut inner = self.lock();
        inner.trade_count = 0;
        inner.consecutive_losses = 0;
    }

    pub fn reset_loss_streak(&self) {
        self.lock().consecutive_losses = 0;
    }

    /// Reset the session counters when the UTC date moved on.
    /// Returns true when a reset happened.
    pub fn maybe_roll_day(&self, today: NaiveDate) -> bool {
        let mut inner = self.lock();
        if today == inner.session_date {
            return false;
        }
        info!(
            from = %inner.session_date,
            to = %today,
            trades = inner.trade_count,
            "New trading day, resetting session counters"
        );
        inner.session_date = today;
        inner.trade_count = 0;
        inner.consecutive_losses = 0;
        true
    }

    pub fn snapshot(&self) -> PortfolioSnapshot {
        let inner = self.lock();
        let mut reserved: Vec<String> = inner.reserved.keys().cloned().collect();
        reserved.sort();
        let mut stranded: Vec<String> = inner.stranded.keys().cloned().collect();
        stranded.sort();
        PortfolioSnapshot {
            reserved,
            stranded,
            exposure_pct: Self::exposure(&inner),
            trade_count: inner.trade_count,
            pending_entries: inner.pending_entries,
            consecutive_losses: inner.consecutive_losses,
            cumulative_realized_pnl: inner.cumulative_realized_pnl,
            wins: inner.wins,
            losses: inner.losses,
            session_date: inner.session_date,
        }
    }
}

/// Exclusive claim on a symbol, released on drop
#[derive(Debug)]
pub struct SymbolReservation {
    state: Arc<PortfolioState>,
    symbol: String,
    active: bool,
    trade_claimed: bool,
}

impl SymbolReservation {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Hold one of today's `cap` trades for this entry. False when the cap
    /// is already taken by filled and pending entries.
    pub fn claim_trade(&mut self, cap: u32) -> bool {
        if !self.trade_claimed {
            self.trade_claimed = self.state.claim_trade(cap);
        }
        self.trade_claimed
    }

    /// The entry filled: count it as a trade, settling any claim
    pub fn confirm_entry(&mut self) -> u32 {
        let claimed = std::mem::take(&mut self.trade_claimed);
        self.state.settle_entry(claimed)
    }

    pub fn release(mut self) {
        self.active = false;
        self.state.release(&self.symbol);
    }

    /// Keep the symbol blocked after a failed close; frees the slot only
    pub fn strand(mut self) {
        self.active = false;
        warn!(symbol = %self.symbol, "Symbol stranded until cleared by an operator");
        self.state.strand(&self.symbol);
    }
}

impl Drop for SymbolReservation {
    fn drop(&mut self) {
        if self.trade_claimed {
            self.state.drop_trade_claim();
        }
        if self.active {
            self.state.release(&self.symbol);
        }
    }
}
