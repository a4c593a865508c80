//! World clock. One game minute passes every [`MS_PER_GAME_MINUTE`] of
//! real time.

use tokio::sync::Mutex;

use super::{ConnId, GameState};
use crate::network::msgs::MsgTimeMinute;

pub const MS_PER_GAME_MINUTE: u64 = 5000;

#[derive(Debug)]
struct Clock {
    game_time: u32,
    accum_ms: u64,
}

#[derive(Debug)]
pub struct TimeMgr {
    clock: Mutex<Clock>,
}

impl TimeMgr {
    pub fn new(game_time: u32) -> Self {
        Self { clock: Mutex::new(Clock { game_time, accum_ms: 0 }) }
    }

    pub async fn game_time(&self) -> u32 {
        self.clock.lock().await.game_time
    }

    /// Add elapsed real time. Returns the new game time when at least one
    /// minute passed.
    pub async fn advance(&self, ms: u64) -> Option<u32> {
        let mut clock = self.clock.lock().await;
        clock.accum_ms += ms;
        let minutes = clock.accum_ms / MS_PER_GAME_MINUTE;
        if minutes == 0 {
            return None;
        }
        clock.accum_ms %= MS_PER_GAME_MINUTE;
        clock.game_time = clock.game_time.wrapping_add(minutes as u32);
        Some(clock.game_time)
    }

    /// Shift the clock by a signed amount of minutes, wrapping.
    pub async fn shift(&self, minutes: i32) -> u32 {
        let mut clock = self.clock.lock().await;
        clock.game_time = clock.game_time.wrapping_add_signed(minutes);
        clock.game_time
    }
}

impl GameState {
    pub async fn time_tick(&self, ms: u64) {
        if let Some(game_time) = self.time.advance(ms).await {
            self.save_time(game_time).await;
            self.send_to_all_players(&MsgTimeMinute { gametime: game_time }).await;
        }
    }

    pub async fn send_time_to_player(&self, conn: ConnId) {
        let gametime = self.time.game_time().await;
        self.net.send_to_conn(conn, &MsgTimeMinute { gametime }).await;
    }

    pub async fn change_time(&self, minutes: i32) -> u32 {
        let game_time = self.time.shift(minutes).await;
        tracing::info!("[time] [changed] delta={} now={}", minutes, game_time);
        self.save_time(game_time).await;
        self.send_to_all_players(&MsgTimeMinute { gametime: game_time }).await;
        game_time
    }

    pub async fn time_finalize(&self) {
        let game_time = self.time.game_time().await;
        self.save_time(game_time).await;
    }

    async fn save_time(&self, game_time: u32) {
        if let Err(e) = self.store.save_game_time(game_time).await {
            tracing::error!("[time] [save_failed] minutes={} err={}", game_time, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_advance_accumulates() {
        let t = TimeMgr::new(10);
        assert_eq!(t.advance(4999).await, None);
        assert_eq!(t.advance(1).await, Some(11));
        assert_eq!(t.advance(10_500).await, Some(13));
        assert_eq!(t.advance(4_499).await, None);
        assert_eq!(t.advance(1).await, Some(14));
    }

    #[tokio::test]
    async fn test_shift_wraps() {
        let t = TimeMgr::new(5);
        assert_eq!(t.shift(-10).await, u32::MAX - 4);
        assert_eq!(t.shift(10).await, 5);
    }

    #[tokio::test]
    async fn test_tick_saves_time() {
        let state = GameState::test_only().await.unwrap();
        state.time_tick(MS_PER_GAME_MINUTE).await;
        assert_eq!(state.store.load_game_time().await.unwrap(), Some(1));

        state.change_time(60).await;
        assert_eq!(state.time.game_time().await, 61);
        assert_eq!(state.store.load_game_time().await.unwrap(), Some(61));
    }
}
