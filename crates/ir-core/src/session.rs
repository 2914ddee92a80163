//! L5 inference session state: per-session KV cache and
//! position tracking across an autoregressive decode loop.

use crate::error::{CoreError, Result};

/// Lifecycle of an `InferenceSession`.
///
/// `Created` sessions have never served a token. `Active` sessions have an
/// in-progress generation. `Inactive` sessions are paused (position and
/// cache contents retained) and can be resumed or reset. `Disposed`
/// sessions have been torn down and reject every further operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Active,
    Inactive,
    Disposed,
}

/// Per-layer key/value cache plus the session's lifecycle and position
/// counter.
///
/// `key_cache`/`value_cache` are one flat `Vec<f32>` per layer, indexed as
/// `[pos][head][dim]` (i.e. row-major with row stride `n_heads * head_dim`)
/// so a single decode step appends one contiguous row per layer rather than
/// scattering writes across a rank-3 tensor.
pub struct InferenceSession {
    n_layers: usize,
    n_heads: usize,
    head_dim: usize,
    max_seq_len: usize,
    current_position: usize,
    state: SessionState,
    key_cache: Vec<Vec<f32>>,
    value_cache: Vec<Vec<f32>>,
}

impl InferenceSession {
    /// Allocates a fresh session with zeroed caches for `n_layers` layers,
    /// each sized for up to `max_seq_len` positions of `n_heads * head_dim`
    /// elements.
    pub fn new(n_layers: usize, n_heads: usize, head_dim: usize, max_seq_len: usize) -> Self {
        let row = n_heads * head_dim;
        InferenceSession {
            n_layers,
            n_heads,
            head_dim,
            max_seq_len,
            current_position: 0,
            state: SessionState::Created,
            key_cache: (0..n_layers).map(|_| vec![0.0; max_seq_len * row]).collect(),
            value_cache: (0..n_layers).map(|_| vec![0.0; max_seq_len * row]).collect(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_position(&self) -> usize {
        self.current_position
    }

    pub fn n_layers(&self) -> usize {
        self.n_layers
    }

    pub fn n_heads(&self) -> usize {
        self.n_heads
    }

    pub fn head_dim(&self) -> usize {
        self.head_dim
    }

    pub fn max_seq_len(&self) -> usize {
        self.max_seq_len
    }

    fn check_layer(&self, layer: usize) -> Result<()> {
        if layer >= self.n_layers {
            return Err(CoreError::DimensionOutOfRange {
                what: "layer",
                index: layer,
                bound: self.n_layers,
            });
        }
        Ok(())
    }

    fn check_active_or_created(&self) -> Result<()> {
        match self.state {
            SessionState::Disposed => Err(CoreError::InvalidState("session is disposed")),
            SessionState::Inactive => Err(CoreError::InvalidState("session is inactive")),
            SessionState::Created | SessionState::Active => Ok(()),
        }
    }

    /// Row-stride `n_heads * head_dim` key-cache buffer for `layer`, valid
    /// for the first `current_position` rows.
    pub fn get_key_cache(&self, layer: usize) -> Result<&[f32]> {
        self.check_layer(layer)?;
        Ok(&self.key_cache[layer])
    }

    /// Mutable view of the key cache for `layer`, for writing the current
    /// decode step's row.
    pub fn get_key_cache_mut(&mut self, layer: usize) -> Result<&mut [f32]> {
        self.check_layer(layer)?;
        Ok(&mut self.key_cache[layer])
    }

    pub fn get_value_cache(&self, layer: usize) -> Result<&[f32]> {
        self.check_layer(layer)?;
        Ok(&self.value_cache[layer])
    }

    pub fn get_value_cache_mut(&mut self, layer: usize) -> Result<&mut [f32]> {
        self.check_layer(layer)?;
        Ok(&mut self.value_cache[layer])
    }

    /// Advances `current_position` by `n`, transitioning `Created -> Active`
    /// on the first call. Fails with `CapacityExceeded` rather than
    /// silently truncating or wrapping if the new position would exceed
    /// `max_seq_len`.
    pub fn advance_position(&mut self, n: usize) -> Result<()> {
        self.check_active_or_created()?;
        let new_pos = self.current_position + n;
        if new_pos > self.max_seq_len {
            return Err(CoreError::CapacityExceeded {
                current: self.current_position,
                requested: n,
                capacity: self.max_seq_len,
            });
        }
        self.current_position = new_pos;
        self.state = SessionState::Active;
        Ok(())
    }

    /// Marks the session paused without discarding cache contents or
    /// position. A disposed session cannot be deactivated.
    pub fn deactivate(&mut self) -> Result<()> {
        if self.state == SessionState::Disposed {
            return Err(CoreError::InvalidState("session is disposed"));
        }
        self.state = SessionState::Inactive;
        Ok(())
    }

    /// Resumes an `Inactive` session without touching position or cache
    /// contents.
    pub fn reactivate(&mut self) -> Result<()> {
        if self.state == SessionState::Disposed {
            return Err(CoreError::InvalidState("session is disposed"));
        }
        self.state = SessionState::Active;
        Ok(())
    }

    /// Zeroes every layer's key/value cache and resets `current_position`
    /// to 0, leaving the session `Active`. Usable from any non-disposed
    /// state (e.g. to start a new conversation on a reused session object).
    pub fn reset(&mut self) -> Result<()> {
        if self.state == SessionState::Disposed {
            return Err(CoreError::InvalidState("session is disposed"));
        }
        for layer in self.key_cache.iter_mut().chain(self.value_cache.iter_mut()) {
            layer.iter_mut().for_each(|v| *v = 0.0);
        }
        self.current_position = 0;
        self.state = SessionState::Active;
        Ok(())
    }

    /// Tears the session down permanently; every subsequent operation
    /// except `state()` returns `InvalidState`.
    pub fn dispose(&mut self) {
        self.key_cache.clear();
        self.value_cache.clear();
        self.state = SessionState::Disposed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_created_at_position_zero() {
        let s = InferenceSession::new(2, 4, 8, 16);
        assert_eq!(s.state(), SessionState::Created);
        assert_eq!(s.current_position(), 0);
    }

    #[test]
    fn advance_position_transitions_to_active() {
        let mut s = InferenceSession::new(2, 4, 8, 16);
        s.advance_position(3).unwrap();
        assert_eq!(s.current_position(), 3);
        assert_eq!(s.state(), SessionState::Active);
    }

    #[test]
    fn advance_position_past_capacity_is_an_error() {
        let mut s = InferenceSession::new(1, 1, 1, 4);
        s.advance_position(4).unwrap();
        assert!(s.advance_position(1).is_err());
        // A failed advance must not have mutated the position.
        assert_eq!(s.current_position(), 4);
    }

    #[test]
    fn deactivate_then_operations_fail_until_reactivated() {
        let mut s = InferenceSession::new(1, 1, 1, 4);
        s.advance_position(1).unwrap();
        s.deactivate().unwrap();
        assert!(s.advance_position(1).is_err());
        s.reactivate().unwrap();
        s.advance_position(1).unwrap();
        assert_eq!(s.current_position(), 2);
    }

    #[test]
    fn reset_clears_cache_and_position() {
        let mut s = InferenceSession::new(1, 1, 2, 4);
        s.get_key_cache_mut(0).unwrap()[0] = 42.0;
        s.advance_position(2).unwrap();
        s.reset().unwrap();
        assert_eq!(s.current_position(), 0);
        assert_eq!(s.state(), SessionState::Active);
        assert_eq!(s.get_key_cache(0).unwrap()[0], 0.0);
    }

    #[test]
    fn reset_from_inactive_returns_to_active() {
        let mut s = InferenceSession::new(1, 1, 1, 4);
        s.advance_position(2).unwrap();
        s.deactivate().unwrap();
        s.reset().unwrap();
        assert_eq!(s.state(), SessionState::Active);
        assert_eq!(s.current_position(), 0);
    }

    #[test]
    fn disposed_session_rejects_further_operations() {
        let mut s = InferenceSession::new(1, 1, 1, 4);
        s.dispose();
        assert_eq!(s.state(), SessionState::Disposed);
        assert!(s.advance_position(1).is_err());
        assert!(s.deactivate().is_err());
        assert!(s.reset().is_err());
    }

    #[test]
    fn layer_index_out_of_range_is_an_error() {
        let s = InferenceSession::new(2, 1, 1, 4);
        assert!(s.get_key_cache(2).is_err());
    }
}
