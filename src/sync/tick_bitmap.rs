//! Tick discovery through the pool's `tickBitmap` words.
//!
//! Word `w` covers compressed ticks `w * 256 ..= w * 256 + 255`; bit `i` set
//! means tick `(w * 256 + i) * tickSpacing` is initialized. Only the
//! configured word window is scanned, not the full int16 range.

use alloy::primitives::U256;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use log::{debug, info};

use crate::sync::{ConfigError, RetryPolicy};

/// Bits per bitmap word
const WORD_BITS: usize = 256;

/// Anything that can read `tickBitmap(word)` for a single pool.
#[async_trait]
pub trait TickBitmapSource: Send + Sync {
    async fn tick_bitmap(&self, word: i16) -> Result<U256>;
}

pub struct TickBitmapScanner {
    min_word: i16,
    max_word: i16,
    fan_out: usize,
    retry: RetryPolicy,
}

impl TickBitmapScanner {
    pub fn new(
        min_word: i16,
        max_word: i16,
        fan_out: usize,
        retry: RetryPolicy,
    ) -> Result<Self, ConfigError> {
        if min_word > max_word {
            return Err(ConfigError(format!(
                "bitmap word range [{}, {}] is empty",
                min_word, max_word
            )));
        }

        Ok(Self {
            min_word,
            max_word,
            fan_out: fan_out.max(1),
            retry,
        })
    }

    /// Returns every initialized tick index in the window, ascending.
    ///
    /// A word whose fetch still fails after all retries is treated as empty
    /// instead of aborting the scan.
    pub async fn scan<S>(&self, source: &S, tick_spacing: i32) -> Result<Vec<i32>>
    where
        S: TickBitmapSource + ?Sized,
    {
        if tick_spacing <= 0 {
            return Err(ConfigError(format!("invalid tick spacing {}", tick_spacing)).into());
        }

        // `buffered` yields in word order regardless of which fetch finishes first
        let bitmaps: Vec<(i16, U256)> = stream::iter(self.min_word..=self.max_word)
            .map(|word| async move {
                let label = format!("tickBitmap({})", word);
                let bitmap = self
                    .retry
                    .execute_or(&label, U256::ZERO, || source.tick_bitmap(word))
                    .await;
                (word, bitmap)
            })
            .buffered(self.fan_out)
            .collect()
            .await;

        let mut indices = Vec::new();
        for (word, bitmap) in bitmaps {
            indices.extend(decode_word(word, bitmap, tick_spacing)?);
        }

        info!(
            "Scanned {} bitmap words [{}, {}], found {} initialized ticks",
            self.max_word as i32 - self.min_word as i32 + 1,
            self.min_word,
            self.max_word,
            indices.len()
        );

        Ok(indices)
    }
}

/// Decodes the set bits of one bitmap word into tick indices, ascending.
pub fn decode_word(word: i16, bitmap: U256, tick_spacing: i32) -> Result<Vec<i32>> {
    if bitmap.is_zero() {
        return Ok(Vec::new());
    }

    let mut indices = Vec::with_capacity(bitmap.count_ones());
    for bit in 0..WORD_BITS {
        if !bitmap.bit(bit) {
            continue;
        }

        let compressed = word as i64 * WORD_BITS as i64 + bit as i64;
        let index = compressed * tick_spacing as i64;
        let index = i32::try_from(index)
            .map_err(|_| anyhow!("tick index {} (word {}, bit {}) overflows i32", index, word, bit))?;
        indices.push(index);
    }

    debug!("Word {} has {} initialized ticks", word, indices.len());
    Ok(indices)
}
