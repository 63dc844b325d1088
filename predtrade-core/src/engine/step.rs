//! One bar of the trading state machine.
//!
//! Shared by the backtest loop and the live tick. Per bar, in order:
//! 1. If open: check the stop against the bar's range. A hit closes at the stop
//!    fill price and takes precedence over any strategy decision.
//! 2. Else if open: ask the strategy whether to close at the bar close.
//! 3. If the bar started flat: ask the strategy whether to open, filter by
//!    trading mode, size the order, open at the bar close.
//!
//! A position closed on a bar is never reopened on the same bar. A missing
//! forecast skips steps 2 and 3 but not step 1.
//!
//! The run context is mutated only after the executor has reported a fill, and
//! the per-bar counters only once the whole bar has succeeded, so an execution
//! failure leaves the context as it was before the bar.

use tracing::{debug, info, warn};

use super::state::{EngineConfig, RunContext};
use super::EngineError;
use crate::domain::{Bar, ExitReason, Position, TradeRecord};
use crate::exchange::OrderExecutor;
use crate::signal::Signal;
use crate::strategy::{MarketContext, Strategy};

/// What happened on one bar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarOutcome {
    pub closed: Option<TradeRecord>,
    pub opened: Option<Position>,
    /// The forecast was missing or malformed; the strategy was not consulted.
    pub signal_skipped: bool,
    /// The strategy wanted to open but the order was below the minimum amount.
    pub order_rejected: bool,
}

/// Strategy plus configuration: everything needed to process a bar except
/// the mutable context and the executor.
pub struct Engine<'a> {
    strategy: &'a dyn Strategy,
    config: &'a EngineConfig,
}

impl<'a> Engine<'a> {
    pub fn new(strategy: &'a dyn Strategy, config: &'a EngineConfig) -> Self {
        Self { strategy, config }
    }

    pub fn config(&self) -> &EngineConfig {
        self.config
    }

    /// Process one bar. `allow_open` is false on the final bar of a backtest.
    pub fn process_bar(
        &self,
        ctx: &mut RunContext,
        executor: &mut dyn OrderExecutor,
        bar_index: usize,
        bar: &Bar,
        forecast: f64,
        allow_open: bool,
    ) -> Result<BarOutcome, EngineError> {
        let mut outcome = BarOutcome::default();

        if bar.is_void() {
            debug!(bar_index, "void bar, holding");
            outcome.signal_skipped = true;
            Self::finish_bar(ctx, bar, &outcome);
            return Ok(outcome);
        }

        let signal = Signal::new(bar_index, forecast, self.config.signal_kind);
        if signal.is_none() {
            debug!(bar_index, forecast, "missing forecast, holding");
            outcome.signal_skipped = true;
        }

        let open_position = ctx.ledger.position().cloned();
        let started_open = open_position.is_some();

        if let Some(position) = &open_position {
            // ── Stop-loss ──
            if let Some(stop_price) = ctx.ledger.check_stop_loss(bar, self.config.gap_policy) {
                let fill = executor.close_order(position, stop_price)?;
                outcome.closed =
                    Some(self.book_close(ctx, bar_index, bar, fill, ExitReason::StopLoss)?);
            // ── Strategy close ──
            } else if let Some(signal) = signal.as_ref() {
                let market = MarketContext {
                    bar_index,
                    bar,
                    balance: ctx.account.balance,
                };
                if self.strategy.should_close(&market, position, signal) {
                    let fill = executor.close_order(position, bar.close)?;
                    outcome.closed =
                        Some(self.book_close(ctx, bar_index, bar, fill, ExitReason::Signal)?);
                }
            }
        }

        // ── Strategy open ──
        if !started_open && allow_open {
            if let Some(signal) = signal.as_ref() {
                self.try_open(ctx, executor, bar_index, bar, signal, &mut outcome)?;
            }
        }

        Self::finish_bar(ctx, bar, &outcome);
        Ok(outcome)
    }

    /// Close any open position at `bar`'s close with `EndOfData`.
    pub fn force_close(
        &self,
        ctx: &mut RunContext,
        executor: &mut dyn OrderExecutor,
        bar_index: usize,
        bar: &Bar,
    ) -> Result<Option<TradeRecord>, EngineError> {
        let Some(position) = ctx.ledger.position().cloned() else {
            return Ok(None);
        };
        let fill = executor.close_order(&position, bar.close)?;
        self.book_close(ctx, bar_index, bar, fill, ExitReason::EndOfData)
            .map(Some)
    }

    /// Stop-check a bar that was never handed to [`process_bar`](Self::process_bar).
    ///
    /// Used by the live tick for bars between the last processed bar and the
    /// newest one. Only the stop is enforced; the strategy is not consulted.
    /// The bar still counts as processed.
    pub fn stop_check_only(
        &self,
        ctx: &mut RunContext,
        executor: &mut dyn OrderExecutor,
        bar_index: usize,
        bar: &Bar,
    ) -> Result<Option<TradeRecord>, EngineError> {
        let mut closed = None;
        if !bar.is_void() {
            if let Some(position) = ctx.ledger.position().cloned() {
                if let Some(stop_price) = ctx.ledger.check_stop_loss(bar, self.config.gap_policy) {
                    let fill = executor.close_order(&position, stop_price)?;
                    closed = Some(self.book_close(ctx, bar_index, bar, fill, ExitReason::StopLoss)?);
                }
            }
        }
        ctx.bars_processed += 1;
        ctx.last_bar_time = Some(bar.timestamp);
        Ok(closed)
    }

    fn try_open(
        &self,
        ctx: &mut RunContext,
        executor: &mut dyn OrderExecutor,
        bar_index: usize,
        bar: &Bar,
        signal: &Signal,
        outcome: &mut BarOutcome,
    ) -> Result<(), EngineError> {
        let market = MarketContext {
            bar_index,
            bar,
            balance: ctx.account.balance,
        };
        let Some(side) = self.strategy.should_open(&market, signal) else {
            return Ok(());
        };
        if !self.config.trading_mode.allows(side) {
            debug!(bar_index, %side, mode = ?self.config.trading_mode, "side not allowed");
            return Ok(());
        }

        let size = self.config.order_size(ctx.account.balance, bar.close);
        if size.is_nan() || size <= 0.0 || size < self.config.min_order_amount {
            warn!(
                bar_index,
                %side,
                size,
                min_order_amount = self.config.min_order_amount,
                balance = ctx.account.balance,
                "not enough balance to open position"
            );
            outcome.order_rejected = true;
            return Ok(());
        }

        let fill = executor.submit_order(side, size, self.config.leverage, bar.close)?;
        let position = ctx
            .ledger
            .open(
                side,
                fill,
                self.config.leverage,
                size,
                self.config.stop_loss,
                bar.timestamp,
                bar_index,
            )?
            .clone();
        info!(
            bar_index,
            %side,
            price = position.entry_price,
            size,
            leverage = position.leverage,
            stop = ?position.stop_loss_price,
            "opened position"
        );
        outcome.opened = Some(position);
        Ok(())
    }

    fn book_close(
        &self,
        ctx: &mut RunContext,
        bar_index: usize,
        bar: &Bar,
        fill: f64,
        reason: ExitReason,
    ) -> Result<TradeRecord, EngineError> {
        let mut trade = ctx.ledger.close(fill, bar.timestamp, bar_index, reason)?;
        trade.balance_after = ctx.account.realize(trade.pnl_amount);
        info!(
            bar_index,
            side = %trade.side,
            entry = trade.entry_price,
            exit = trade.exit_price,
            pnl_rate = trade.pnl_rate,
            balance = trade.balance_after,
            reason = %reason,
            "closed position"
        );
        ctx.trades.push(trade.clone());
        Ok(trade)
    }

    fn finish_bar(ctx: &mut RunContext, bar: &Bar, outcome: &BarOutcome) {
        ctx.bars_processed += 1;
        ctx.last_bar_time = Some(bar.timestamp);
        if outcome.signal_skipped {
            ctx.skipped_signals += 1;
        }
        if outcome.order_rejected {
            ctx.rejected_orders += 1;
        }
    }
}
