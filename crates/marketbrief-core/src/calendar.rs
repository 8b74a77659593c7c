//! Trading-session calendar for the mainland A-share market.
//!
//! Answers one question: is the market trading right now? The cache store
//! consults it to decide whether a non-trading TTL floor applies. Sessions
//! are 09:30–11:30 and 13:00–15:00 local time; the morning window starts at
//! 09:15 so that data fetched during the pre-open call auction is treated as
//! live rather than stale.

use time::{Date, OffsetDateTime, Time, UtcOffset, Weekday};

/// Seam between the cache store and the wall clock, so tests can pin the
/// market open or closed without touching real time.
pub trait TradingHours: Send + Sync {
    fn is_trading_now(&self) -> bool;
}

/// Exchange closure days that fall on weekdays (weekends are excluded by the
/// weekday check). Covers the published 2024–2026 closures for SSE/SZSE:
/// New Year, Spring Festival, Qingming, Labour Day, Dragon Boat, Mid-Autumn
/// and National Day.
const HOLIDAYS: &[(i32, u8, u8)] = &[
    // 2024
    (2024, 1, 1),
    (2024, 2, 9),
    (2024, 2, 12),
    (2024, 2, 13),
    (2024, 2, 14),
    (2024, 2, 15),
    (2024, 2, 16),
    (2024, 4, 4),
    (2024, 4, 5),
    (2024, 5, 1),
    (2024, 5, 2),
    (2024, 5, 3),
    (2024, 6, 10),
    (2024, 9, 16),
    (2024, 9, 17),
    (2024, 10, 1),
    (2024, 10, 2),
    (2024, 10, 3),
    (2024, 10, 4),
    (2024, 10, 7),
    // 2025
    (2025, 1, 1),
    (2025, 1, 28),
    (2025, 1, 29),
    (2025, 1, 30),
    (2025, 1, 31),
    (2025, 2, 3),
    (2025, 2, 4),
    (2025, 4, 4),
    (2025, 5, 1),
    (2025, 5, 2),
    (2025, 5, 5),
    (2025, 6, 2),
    (2025, 10, 1),
    (2025, 10, 2),
    (2025, 10, 3),
    (2025, 10, 6),
    (2025, 10, 7),
    (2025, 10, 8),
    // 2026
    (2026, 1, 1),
    (2026, 1, 2),
    (2026, 2, 16),
    (2026, 2, 17),
    (2026, 2, 18),
    (2026, 2, 19),
    (2026, 2, 20),
    (2026, 4, 6),
    (2026, 5, 1),
    (2026, 6, 19),
    (2026, 9, 25),
    (2026, 10, 1),
    (2026, 10, 2),
    (2026, 10, 5),
    (2026, 10, 6),
    (2026, 10, 7),
];

/// Stateless calendar over the static holiday table.
#[derive(Debug, Clone, Copy, Default)]
pub struct TradingCalendar;

impl TradingCalendar {
    pub fn new() -> Self {
        Self
    }

    /// True while the market is in session, in Beijing time (fixed UTC+8,
    /// mainland China observes no DST).
    ///
    /// If the offset cannot be constructed the calendar assumes trading, so
    /// a misconfigured environment shortens cache lifetimes instead of
    /// silently extending them.
    pub fn is_trading_now(&self) -> bool {
        match UtcOffset::from_hms(8, 0, 0) {
            Ok(offset) => self.is_trading_at(OffsetDateTime::now_utc().to_offset(offset)),
            Err(_) => true,
        }
    }

    /// Pure session check against an already-localized timestamp.
    pub fn is_trading_at(&self, local: OffsetDateTime) -> bool {
        if matches!(local.weekday(), Weekday::Saturday | Weekday::Sunday) {
            return false;
        }
        if is_holiday(local.date()) {
            return false;
        }

        let time = local.time();
        in_session(time, (9, 15), (11, 30)) || in_session(time, (13, 0), (15, 0))
    }
}

impl TradingHours for TradingCalendar {
    fn is_trading_now(&self) -> bool {
        TradingCalendar::is_trading_now(self)
    }
}

fn is_holiday(date: Date) -> bool {
    let key = (date.year(), u8::from(date.month()), date.day());
    HOLIDAYS.contains(&key)
}

fn in_session(time: Time, open: (u8, u8), close: (u8, u8)) -> bool {
    let (open, close) = match (
        Time::from_hms(open.0, open.1, 0),
        Time::from_hms(close.0, close.1, 0),
    ) {
        (Ok(open), Ok(close)) => (open, close),
        _ => return true,
    };
    time >= open && time <= close
}
