//! Math wrappers. Purely functional, no kernel state, so no rollback
//! behaviour is needed beyond what the standard library already gives
//! `f64`; present only so callers can route math through the same
//! `&mut Transaction`-threading convention as every other wrapper.

use crate::tx::Transaction;

pub fn sqrt_tx(_tx: &Transaction, x: f64) -> f64 {
    x.sqrt()
}

pub fn pow_tx(_tx: &Transaction, base: f64, exp: f64) -> f64 {
    base.powf(exp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TxConfig;
    use crate::shadow::file_tx::CcMode;

    #[test]
    fn sqrt_and_pow_agree_with_std() {
        let config = TxConfig::default();
        let (sq, pw) = crate::tx::begin(CcMode::Twopl, &config, |tx| {
            Ok((sqrt_tx(tx, 9.0), pow_tx(tx, 2.0, 10.0)))
        })
        .unwrap();
        assert_eq!(sq, 3.0);
        assert_eq!(pw, 1024.0);
    }
}
