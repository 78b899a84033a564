//! Reserve and valuation arithmetic.
//!
//! Every on-chain quantity (vault balances, open-orders totals, LP amounts,
//! supplies) stays an integer end to end. Intermediates widen to u128, which
//! holds any product of two u64 values exactly; conversion to f64 happens
//! only at the final SOL/display boundary. Decimal-9 mints with supplies in
//! the billions overflow an f64 mantissa long before they overflow u128.

/// Raw accounting snapshot of one AMM pool, as read on chain.
#[derive(Debug, Clone, Copy)]
pub struct PoolReserves {
    pub base_vault: u64,
    pub quote_vault: u64,
    /// Totals parked in the AMM's open-orders account, per side.
    pub base_open_orders: u64,
    pub quote_open_orders: u64,
    /// Accrued protocol profit awaiting withdrawal, per side.
    pub base_need_take_pnl: u64,
    pub quote_need_take_pnl: u64,
    /// The AMM's internal LP counter. Not the mint supply: burned LP reduces
    /// the mint supply below this figure.
    pub lp_circulating: u64,
    pub base_decimals: u8,
    pub quote_decimals: u8,
}

impl PoolReserves {
    /// Usable base-side reserve: vault + open orders − accrued pnl, floored
    /// at vault + open orders if the pnl offset exceeds the total.
    pub fn effective_base(&self) -> u64 {
        effective_reserve(self.base_vault, self.base_open_orders, self.base_need_take_pnl)
    }

    pub fn effective_quote(&self) -> u64 {
        effective_reserve(self.quote_vault, self.quote_open_orders, self.quote_need_take_pnl)
    }

    /// Spot price as quote-per-base in natural (decimal-adjusted) units.
    ///
    /// This is the one place reserves meet floating point, and it happens on
    /// already-final u64 values.
    pub fn price_ratio(&self) -> f64 {
        let base = self.effective_base();
        let quote = self.effective_quote();
        if base == 0 || quote == 0 {
            return 0.0;
        }
        let base_units = base as f64 / 10f64.powi(self.base_decimals as i32);
        let quote_units = quote as f64 / 10f64.powi(self.quote_decimals as i32);
        quote_units / base_units
    }

    /// The holder's pro-rata claim on both reserves for `lp_raw` LP tokens.
    ///
    /// Returns raw (base, quote) amounts. Zero circulating LP yields zero.
    pub fn lp_share(&self, lp_raw: u64) -> (u64, u64) {
        if self.lp_circulating == 0 {
            return (0, 0);
        }
        let share = |reserve: u64| -> u64 {
            ((lp_raw as u128 * reserve as u128) / self.lp_circulating as u128) as u64
        };
        (share(self.effective_base()), share(self.effective_quote()))
    }

    /// SOL-denominated value of `lp_raw` LP tokens, with the non-WSOL share
    /// converted at the current pool ratio.
    ///
    /// `base_is_wsol` says which side of the pair is wrapped SOL. The whole
    /// computation runs in integer lamports; only the final value is floated.
    pub fn lp_value_sol(&self, lp_raw: u64, base_is_wsol: bool) -> f64 {
        let (share_base, share_quote) = self.lp_share(lp_raw);
        let base = self.effective_base();
        let quote = self.effective_quote();
        if base == 0 || quote == 0 {
            return 0.0;
        }

        // Convert the token side into lamports of the WSOL side at the pool
        // ratio, keeping the multiply before the divide.
        let lamports: u128 = if base_is_wsol {
            share_base as u128 + (share_quote as u128 * base as u128) / quote as u128
        } else {
            share_quote as u128 + (share_base as u128 * quote as u128) / base as u128
        };
        lamports as f64 / 1e9
    }
}

fn effective_reserve(vault: u64, open_orders: u64, need_take_pnl: u64) -> u64 {
    let gross = vault as u128 + open_orders as u128;
    // A pnl offset larger than the whole reserve is bad accounting data;
    // ignore it rather than go negative.
    let net = if (need_take_pnl as u128) > gross {
        gross
    } else {
        gross - need_take_pnl as u128
    };
    net.min(u64::MAX as u128) as u64
}

/// Constant-product impermanent loss for a price move of `last/entry`.
///
/// `IL = 2·√r/(1+r) − 1`, always ≤ 0; returned as a fraction (−0.057 = −5.7%).
pub fn impermanent_loss(entry_price_ratio: f64, last_price_ratio: f64) -> f64 {
    if entry_price_ratio <= 0.0 || last_price_ratio <= 0.0 {
        return 0.0;
    }
    let r = last_price_ratio / entry_price_ratio;
    2.0 * r.sqrt() / (1.0 + r) - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reserves(base: u64, quote: u64, lp: u64) -> PoolReserves {
        PoolReserves {
            base_vault: base,
            quote_vault: quote,
            base_open_orders: 0,
            quote_open_orders: 0,
            base_need_take_pnl: 0,
            quote_need_take_pnl: 0,
            lp_circulating: lp,
            base_decimals: 9,
            quote_decimals: 9,
        }
    }

    #[test]
    fn effective_reserve_never_negative() {
        // pnl offset larger than the whole reserve falls back to the gross
        assert_eq!(effective_reserve(100, 50, 10_000), 150);
        assert_eq!(effective_reserve(100, 50, 30), 120);
        assert_eq!(effective_reserve(0, 0, 0), 0);
    }

    #[test]
    fn price_ratio_adjusts_decimals() {
        let mut r = reserves(2_000_000_000, 1_000_000_000, 1);
        assert!((r.price_ratio() - 0.5).abs() < 1e-12);
        // 6-decimal base against 9-decimal quote
        r.base_decimals = 6;
        r.base_vault = 2_000_000;
        assert!((r.price_ratio() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn lp_share_is_pro_rata() {
        let r = reserves(1_000_000, 4_000_000, 10_000);
        let (base, quote) = r.lp_share(2_500);
        assert_eq!(base, 250_000);
        assert_eq!(quote, 1_000_000);
    }

    #[test]
    fn lp_share_zero_circulating_is_zero() {
        let r = reserves(1_000_000, 4_000_000, 0);
        assert_eq!(r.lp_share(2_500), (0, 0));
    }

    #[test]
    fn lp_share_survives_huge_reserves() {
        // base_reserve = 2^60 with lp_raw = 2^50: the product is 2^110 and
        // must not round. An f64 path loses the low bits; the exact quotient
        // is reserve >> 13.
        let base: u64 = 1 << 60;
        let quote: u64 = 1_000_000_000_000;
        let lp_circulating: u64 = 1 << 63;
        let lp_raw: u64 = 1 << 50;
        let r = PoolReserves {
            base_vault: base,
            quote_vault: quote,
            base_open_orders: 0,
            quote_open_orders: 0,
            base_need_take_pnl: 0,
            quote_need_take_pnl: 0,
            lp_circulating,
            base_decimals: 9,
            quote_decimals: 9,
        };
        let (share_base, share_quote) = r.lp_share(lp_raw);
        assert_eq!(share_base, base >> 13);
        assert_eq!(share_quote, quote >> 13);

        // Demonstrate the f64 path is not exact on an odd reserve: the
        // integer path must match the arbitrary-precision quotient bit for
        // bit, which the float product cannot represent.
        let odd_base = (1u64 << 60) + 12_345_677;
        let exact = ((lp_raw as u128 * odd_base as u128) / lp_circulating as u128) as u64;
        let via_f64 = (lp_raw as f64 * odd_base as f64 / lp_circulating as f64) as u64;
        let r2 = PoolReserves { base_vault: odd_base, ..r };
        assert_eq!(r2.lp_share(lp_raw).0, exact);
        assert_ne!(exact, via_f64);
    }

    #[test]
    fn lp_value_counts_both_sides() {
        // 1:1 pool, 9/9 decimals, holder owns 10% of LP.
        let r = reserves(10_000_000_000, 10_000_000_000, 1_000_000_000);
        let value = r.lp_value_sol(100_000_000, false);
        // 10% of each side = 1 SOL quote + 1 SOL worth of base.
        assert!((value - 2.0).abs() < 1e-9);
    }

    #[test]
    fn il_is_zero_at_entry_ratio() {
        assert_eq!(impermanent_loss(2.0, 2.0), 0.0);
    }

    #[test]
    fn il_matches_closed_form() {
        // 4x price move: IL = 2·2/5 − 1 = −0.2
        let il = impermanent_loss(1.0, 4.0);
        assert!((il + 0.2).abs() < 1e-12);
        // symmetric in direction of the move
        let il_down = impermanent_loss(4.0, 1.0);
        assert!((il_down + 0.2).abs() < 1e-12);
    }

    #[test]
    fn il_guards_bad_ratios() {
        assert_eq!(impermanent_loss(0.0, 2.0), 0.0);
        assert_eq!(impermanent_loss(2.0, -1.0), 0.0);
    }
}
