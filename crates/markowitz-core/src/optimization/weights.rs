use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::error::MarkowitzError;
use crate::types::Weight;
use crate::MarkowitzResult;

/// Turn raw solver weights into reportable ones.
///
/// Each weight is rounded to `decimals` places and anything under `floor`
/// becomes exactly zero. The survivors are rescaled proportionally so the
/// result sums to exactly one; the last sub-unit residual goes to the
/// largest fractional remainders (ties by position). No weight is pushed
/// above `max_weight`: excess from capped assets is spread proportionally
/// over the others. When `max_weight` is not a whole number of units and the
/// budget only fits with every asset at the cap (for example 1/3 over three
/// assets), a weight may exceed the cap by at most one unit.
pub fn clean_weights(
    raw: &[f64],
    max_weight: f64,
    floor: f64,
    decimals: u32,
) -> MarkowitzResult<Vec<Weight>> {
    let context = "weight cleaning";
    let floor_dec = Decimal::from_f64(floor)
        .ok_or_else(|| MarkowitzError::numerical(context, format!("invalid floor {}", floor)))?;

    let mut rounded: Vec<Decimal> = Vec::with_capacity(raw.len());
    for (i, w) in raw.iter().enumerate() {
        if !w.is_finite() {
            return Err(MarkowitzError::numerical(
                context,
                format!("weight {} is not finite ({})", i, w),
            ));
        }
        let d = Decimal::from_f64(w.max(0.0)).ok_or_else(|| {
            MarkowitzError::numerical(context, format!("weight {} cannot be represented ({})", i, w))
        })?;
        let d = d.round_dp(decimals);
        rounded.push(if d < floor_dec { Decimal::ZERO } else { d });
    }

    let total: Decimal = rounded.iter().sum();
    if total.is_zero() {
        return Err(MarkowitzError::numerical(
            context,
            "every weight is below the negligible-weight floor",
        ));
    }

    let scale = Decimal::from_i64(10_i64.pow(decimals)).ok_or_else(|| {
        MarkowitzError::numerical(context, format!("unsupported precision {}", decimals))
    })?;
    let cap_scaled = Decimal::from_f64(max_weight)
        .map(|m| m * scale)
        .ok_or_else(|| {
            MarkowitzError::numerical(context, format!("invalid max weight {}", max_weight))
        })?;
    // A cap such as 1/3 is not representable in units; when the floored cap
    // cannot hold the budget, the cap rounds up by at most one unit.
    let active = Decimal::from(rounded.iter().filter(|w| !w.is_zero()).count());
    let cap_units = if cap_scaled.floor() * active < scale {
        cap_scaled.ceil()
    } else {
        cap_scaled.floor()
    };

    // Real-valued shares of the budget in units of 10^-decimals.
    let mut shares: Vec<Decimal> = rounded.iter().map(|w| *w / total * scale).collect();
    cap_and_redistribute(&mut shares, cap_units);

    let mut units: Vec<Decimal> = shares.iter().map(|s| s.floor()).collect();
    let assigned: Decimal = units.iter().sum();
    let mut residual = (scale - assigned)
        .to_i64()
        .ok_or_else(|| MarkowitzError::numerical(context, "residual out of range"))?;

    if residual > 0 {
        let mut order: Vec<usize> = (0..shares.len())
            .filter(|&i| !rounded[i].is_zero())
            .collect();
        order.sort_by(|&i, &j| {
            let fi = shares[i] - shares[i].floor();
            let fj = shares[j] - shares[j].floor();
            fj.cmp(&fi).then(i.cmp(&j))
        });
        while residual > 0 {
            let mut progressed = false;
            for &i in &order {
                if residual == 0 {
                    break;
                }
                if units[i] < cap_units {
                    units[i] += Decimal::ONE;
                    residual -= 1;
                    progressed = true;
                }
            }
            if !progressed {
                return Err(MarkowitzError::numerical(
                    context,
                    format!(
                        "cannot distribute {} remaining units without breaching max weight {}",
                        residual, max_weight
                    ),
                ));
            }
        }
    }

    units
        .into_iter()
        .map(|u| {
            u.to_i64()
                .map(|v| Decimal::new(v, decimals))
                .ok_or_else(|| MarkowitzError::numerical(context, "weight out of range"))
        })
        .collect()
}

/// Cap shares at `cap` and hand the excess to uncapped positive shares in
/// proportion to their size, until nothing exceeds the cap.
fn cap_and_redistribute(shares: &mut [Decimal], cap: Decimal) {
    let mut capped = vec![false; shares.len()];
    loop {
        let mut excess = Decimal::ZERO;
        for (i, s) in shares.iter_mut().enumerate() {
            if *s > cap {
                excess += *s - cap;
                *s = cap;
                capped[i] = true;
            }
        }
        if excess.is_zero() {
            return;
        }
        let receivers: Decimal = shares
            .iter()
            .enumerate()
            .filter(|(i, s)| !capped[*i] && !s.is_zero())
            .map(|(_, s)| *s)
            .sum();
        if receivers.is_zero() {
            return;
        }
        for (i, s) in shares.iter_mut().enumerate() {
            if !capped[i] && !s.is_zero() {
                *s += excess * *s / receivers;
            }
        }
    }
}
