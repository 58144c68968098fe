//! # time 模块说明
//!
//! ## 角色定位（Why）
//! - TIME_SWITCH 的每个 TIME 子节点描述一个 RFC 2445 风格的重复时间段；
//! - 本模块把属性文本解析为 [`Recurrence`]，并提供基于 `chrono`/`chrono-tz` 的默认匹配器。
//!
//! ## 匹配流程（How）
//! 1. 把到达时刻换算为 TIME_SWITCH 指定时区的本地时间；
//! 2. 早于 DTSTART 不匹配，落在首个时间段 `[DTSTART, DTSTART + 时长]` 内直接匹配；
//! 3. 越过 UNTIL（或由 COUNT 推得的上界）不匹配；
//! 4. 依次检查 FREQ/INTERVAL 周期、最小周期单元内的时刻窗口、BYxxx 过滤条件。
//!
//! ## 取舍（Trade-offs）
//! - COUNT 近似为 `DTSTART + (COUNT-1) × INTERVAL × FREQ` 的上界，忽略 BYxxx 对实例数的影响；
//! - BYSETPOS 仅被接受，不参与匹配；
//! - 仅支持 DAILY/WEEKLY/MONTHLY/YEARLY 四种频率，更细粒度的频率视为没有重复规则。

use chrono::{
    DateTime, Datelike, Months, NaiveDate, NaiveDateTime, TimeDelta, Timelike, Utc, Weekday,
};
use chrono_tz::Tz;
use thiserror::Error;

use crate::error::CollaboratorError;
use crate::script::tree::time as attr;

/// 时间属性文本无法解析。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {attribute} value `{value}`")]
pub struct TimeParseError {
    pub attribute: &'static str,
    pub value: String,
}

impl TimeParseError {
    fn new(attribute: &'static str, value: &str) -> Self {
        Self {
            attribute,
            value: value.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// BYDAY 的单项，`ordinal` 为 0 表示该星期几的任意一次出现。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekdayRule {
    pub ordinal: i8,
    pub weekday: Weekday,
}

/// 一个 TIME 节点描述的重复时间段。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recurrence {
    pub dtstart: NaiveDateTime,
    pub duration: TimeDelta,
    pub freq: Option<Frequency>,
    pub interval: u32,
    pub until: Option<NaiveDateTime>,
    pub count: Option<u32>,
    pub by_second: Vec<u32>,
    pub by_minute: Vec<u32>,
    pub by_hour: Vec<u32>,
    pub by_day: Vec<WeekdayRule>,
    pub by_month_day: Vec<i32>,
    pub by_year_day: Vec<i32>,
    pub by_week_no: Vec<i32>,
    pub by_month: Vec<u32>,
    pub by_set_pos: Vec<i32>,
    pub wkst: Weekday,
}

/// 逐个属性累积 TIME 节点内容。
///
/// - **契约 (What)**：`build` 要求 DTSTART 存在，且 DTEND 与 DURATION 恰好出现一个；
///   违反时返回描述性文本，由求值器包装为格式错误。
#[derive(Debug, Default)]
pub struct RecurrenceBuilder {
    dtstart: Option<NaiveDateTime>,
    dtend: Option<NaiveDateTime>,
    duration: Option<TimeDelta>,
    freq: Option<Frequency>,
    interval: Option<u32>,
    until: Option<NaiveDateTime>,
    count: Option<u32>,
    by_second: Vec<u32>,
    by_minute: Vec<u32>,
    by_hour: Vec<u32>,
    by_day: Vec<WeekdayRule>,
    by_month_day: Vec<i32>,
    by_year_day: Vec<i32>,
    by_week_no: Vec<i32>,
    by_month: Vec<u32>,
    by_set_pos: Vec<i32>,
    wkst: Option<Weekday>,
}

impl RecurrenceBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 按属性码写入一个属性值。未知属性码返回 `Ok(false)`。
    pub fn set(&mut self, code: u16, value: &str) -> Result<bool, TimeParseError> {
        let value = value.trim();
        match code {
            attr::DTSTART => self.dtstart = Some(parse_datetime("DTSTART", value)?),
            attr::DTEND => self.dtend = Some(parse_datetime("DTEND", value)?),
            attr::DURATION => self.duration = Some(parse_duration(value)?),
            attr::FREQ => self.freq = parse_freq(value)?,
            attr::INTERVAL => {
                let interval = value
                    .parse::<u32>()
                    .map_err(|_| TimeParseError::new("INTERVAL", value))?;
                self.interval = Some(interval.max(1));
            }
            attr::UNTIL => self.until = Some(parse_datetime("UNTIL", value)?),
            attr::COUNT => {
                self.count = Some(
                    value
                        .parse::<u32>()
                        .map_err(|_| TimeParseError::new("COUNT", value))?,
                );
            }
            attr::BYSECOND => self.by_second = parse_list("BYSECOND", value, 0..=60)?,
            attr::BYMINUTE => self.by_minute = parse_list("BYMINUTE", value, 0..=59)?,
            attr::BYHOUR => self.by_hour = parse_list("BYHOUR", value, 0..=23)?,
            attr::BYDAY => self.by_day = parse_by_day(value)?,
            attr::BYMONTHDAY => self.by_month_day = parse_signed_list("BYMONTHDAY", value, 31)?,
            attr::BYYEARDAY => self.by_year_day = parse_signed_list("BYYEARDAY", value, 366)?,
            attr::BYWEEKNO => self.by_week_no = parse_signed_list("BYWEEKNO", value, 53)?,
            attr::BYMONTH => self.by_month = parse_list("BYMONTH", value, 1..=12)?,
            attr::WKST => {
                let wkst = parse_weekday(value).ok_or_else(|| TimeParseError::new("WKST", value))?;
                self.wkst = Some(wkst);
            }
            attr::BYSETPOS => self.by_set_pos = parse_signed_list("BYSETPOS", value, 366)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    pub fn build(self) -> Result<Recurrence, String> {
        let dtstart = self.dtstart.ok_or("TIME requires DTSTART")?;
        let duration = match (self.dtend, self.duration) {
            (Some(end), None) => end - dtstart,
            (None, Some(duration)) => duration,
            (Some(_), Some(_)) => return Err("TIME accepts only one of DTEND and DURATION".into()),
            (None, None) => return Err("TIME requires DTEND or DURATION".into()),
        };
        if duration < TimeDelta::zero() {
            return Err("TIME ends before it starts".into());
        }
        Ok(Recurrence {
            dtstart,
            duration,
            freq: self.freq,
            interval: self.interval.unwrap_or(1),
            until: self.until,
            count: self.count,
            by_second: self.by_second,
            by_minute: self.by_minute,
            by_hour: self.by_hour,
            by_day: self.by_day,
            by_month_day: self.by_month_day,
            by_year_day: self.by_year_day,
            by_week_no: self.by_week_no,
            by_month: self.by_month,
            by_set_pos: self.by_set_pos,
            wkst: self.wkst.unwrap_or(Weekday::Mon),
        })
    }
}

impl Recurrence {
    /// 以本地（浮动）时间判断是否落在某个重复实例内。
    #[must_use]
    pub fn matches_local(&self, at: NaiveDateTime) -> bool {
        if at < self.dtstart {
            return false;
        }
        // 结束时刻溢出时视为首个实例永不结束。
        let first_end = self.dtstart.checked_add_signed(self.duration);
        if first_end.is_none_or(|end| at <= end) {
            return true;
        }
        if let Some(bound) = self.effective_until() {
            if bound.checked_add_signed(self.duration).is_some_and(|last| at >= last) {
                return false;
            }
        }
        let Some(freq) = self.freq else {
            return false;
        };
        self.interval_matches(freq, at.date()) && self.min_unit_matches(at) && self.by_rules_match(at)
    }

    fn effective_until(&self) -> Option<NaiveDateTime> {
        if self.until.is_some() {
            return self.until;
        }
        let count = self.count?;
        let steps = count.saturating_sub(1).saturating_mul(self.interval);
        let start = self.dtstart;
        match self.freq? {
            Frequency::Daily => start.checked_add_signed(TimeDelta::try_days(i64::from(steps))?),
            Frequency::Weekly => start.checked_add_signed(TimeDelta::try_weeks(i64::from(steps))?),
            Frequency::Monthly => start.checked_add_months(Months::new(steps)),
            Frequency::Yearly => start.checked_add_months(Months::new(steps.checked_mul(12)?)),
        }
    }

    fn interval_matches(&self, freq: Frequency, date: NaiveDate) -> bool {
        let interval = i64::from(self.interval);
        if interval <= 1 {
            return true;
        }
        let start = self.dtstart.date();
        let elapsed = match freq {
            Frequency::Daily => (date - start).num_days(),
            Frequency::Weekly => {
                (week_start(date, self.wkst) - week_start(start, self.wkst)).num_days() / 7
            }
            Frequency::Monthly => {
                i64::from(date.year() - start.year()) * 12 + i64::from(date.month())
                    - i64::from(start.month())
            }
            Frequency::Yearly => i64::from(date.year() - start.year()),
        };
        elapsed % interval == 0
    }

    /// 最小周期单元内的日期对齐与时刻窗口检查。
    fn min_unit_matches(&self, at: NaiveDateTime) -> bool {
        let start = self.dtstart;
        let aligned = match self.min_unit() {
            Some(Frequency::Daily) | None => true,
            Some(Frequency::Weekly) => at.weekday() == start.weekday(),
            Some(Frequency::Monthly) => at.day() == start.day(),
            Some(Frequency::Yearly) => at.month() == start.month() && at.day() == start.day(),
        };
        if !aligned {
            return false;
        }
        let offset = at.time() - start.time();
        offset >= TimeDelta::zero() && offset < self.duration
    }

    fn min_unit(&self) -> Option<Frequency> {
        let freq = self.freq?;
        if freq == Frequency::Daily
            || !self.by_day.is_empty()
            || !self.by_month_day.is_empty()
            || !self.by_year_day.is_empty()
        {
            Some(Frequency::Daily)
        } else if freq == Frequency::Weekly || !self.by_week_no.is_empty() {
            Some(Frequency::Weekly)
        } else if freq == Frequency::Monthly || !self.by_month.is_empty() {
            Some(Frequency::Monthly)
        } else {
            Some(Frequency::Yearly)
        }
    }

    fn by_rules_match(&self, at: NaiveDateTime) -> bool {
        let date = at.date();
        if !self.by_month.is_empty() && !self.by_month.contains(&date.month()) {
            return false;
        }
        if !self.by_week_no.is_empty() {
            let (week, weeks_in_year) = week_number(date, self.wkst);
            if !self
                .by_week_no
                .iter()
                .any(|&n| signed_index_matches(n, week, weeks_in_year))
            {
                return false;
            }
        }
        if !self.by_year_day.is_empty() {
            let days = days_in_year(date.year());
            if !self
                .by_year_day
                .iter()
                .any(|&n| signed_index_matches(n, date.ordinal() as i32, days))
            {
                return false;
            }
        }
        if !self.by_month_day.is_empty() {
            let days = days_in_month(date);
            if !self
                .by_month_day
                .iter()
                .any(|&n| signed_index_matches(n, date.day() as i32, days))
            {
                return false;
            }
        }
        if !self.by_day.is_empty() && !self.by_day.iter().any(|rule| self.weekday_matches(*rule, date)) {
            return false;
        }
        if !self.by_hour.is_empty() && !self.by_hour.contains(&at.hour()) {
            return false;
        }
        if !self.by_minute.is_empty() && !self.by_minute.contains(&at.minute()) {
            return false;
        }
        if !self.by_second.is_empty() && !self.by_second.contains(&at.second()) {
            return false;
        }
        true
    }

    fn weekday_matches(&self, rule: WeekdayRule, date: NaiveDate) -> bool {
        if date.weekday() != rule.weekday {
            return false;
        }
        if rule.ordinal == 0 {
            return true;
        }
        let (nth, total) = match self.freq {
            Some(Frequency::Yearly) => {
                let days = days_in_year(date.year());
                let nth = (date.ordinal() as i32 - 1) / 7 + 1;
                let total = nth + (days - date.ordinal() as i32) / 7;
                (nth, total)
            }
            Some(Frequency::Monthly) => {
                let days = days_in_month(date);
                let nth = (date.day() as i32 - 1) / 7 + 1;
                let total = nth + (days - date.day() as i32) / 7;
                (nth, total)
            }
            _ => return true,
        };
        signed_index_matches(i32::from(rule.ordinal), nth, total)
    }
}

/// 负数索引从末尾倒数：`-1` 表示最后一个。
fn signed_index_matches(wanted: i32, actual: i32, total: i32) -> bool {
    if wanted > 0 {
        wanted == actual
    } else {
        total + 1 + wanted == actual
    }
}

fn days_in_year(year: i32) -> i32 {
    if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
        366
    } else {
        365
    }
}

fn days_in_month(date: NaiveDate) -> i32 {
    let first = date.with_day(1).unwrap_or(date);
    first
        .checked_add_months(Months::new(1))
        .map_or(31, |next| (next - first).num_days() as i32)
}

fn week_start(date: NaiveDate, wkst: Weekday) -> NaiveDate {
    let back = (7 + date.weekday().num_days_from_monday() - wkst.num_days_from_monday()) % 7;
    date - TimeDelta::days(i64::from(back))
}

/// 第一周为包含至少四天的那一周，周起始日由 WKST 决定。
fn first_week_start(year: i32, wkst: Weekday) -> NaiveDate {
    let jan4 = NaiveDate::from_ymd_opt(year, 1, 4).unwrap_or(NaiveDate::MIN);
    week_start(jan4, wkst)
}

/// 返回 (周序号, 该年总周数)。
fn week_number(date: NaiveDate, wkst: Weekday) -> (i32, i32) {
    let mut year = date.year();
    if date < first_week_start(year, wkst) {
        year -= 1;
    } else if date >= first_week_start(year + 1, wkst) {
        year += 1;
    }
    let start = first_week_start(year, wkst);
    let next = first_week_start(year + 1, wkst);
    let week = (date - start).num_days() / 7 + 1;
    let total = (next - start).num_days() / 7;
    (week as i32, total as i32)
}

fn parse_datetime(attribute: &'static str, value: &str) -> Result<NaiveDateTime, TimeParseError> {
    let text = value.strip_suffix('Z').unwrap_or(value);
    if text.len() == 8 {
        return NaiveDate::parse_from_str(text, "%Y%m%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .ok_or_else(|| TimeParseError::new(attribute, value));
    }
    NaiveDateTime::parse_from_str(text, "%Y%m%dT%H%M%S")
        .map_err(|_| TimeParseError::new(attribute, value))
}

/// 解析 `[+]P[nW][nD][T[nH][nM][nS]]`，负时长视为非法。
fn parse_duration(value: &str) -> Result<TimeDelta, TimeParseError> {
    let err = || TimeParseError::new("DURATION", value);
    let text = value.strip_prefix('+').unwrap_or(value);
    let mut rest = text.strip_prefix(['P', 'p']).ok_or_else(err)?;
    let mut seconds: i64 = 0;
    let mut in_time = false;
    let mut seen = false;
    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix(['T', 't']) {
            if in_time {
                return Err(err());
            }
            in_time = true;
            rest = tail;
            continue;
        }
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 || digits == rest.len() {
            return Err(err());
        }
        let amount: i64 = rest[..digits].parse().map_err(|_| err())?;
        let unit = rest.as_bytes()[digits].to_ascii_uppercase();
        let scale = match (in_time, unit) {
            (false, b'W') => 7 * 86_400,
            (false, b'D') => 86_400,
            (true, b'H') => 3_600,
            (true, b'M') => 60,
            (true, b'S') => 1,
            _ => return Err(err()),
        };
        seconds = amount
            .checked_mul(scale)
            .and_then(|v| seconds.checked_add(v))
            .ok_or_else(err)?;
        seen = true;
        rest = &rest[digits + 1..];
    }
    if !seen {
        return Err(err());
    }
    TimeDelta::try_seconds(seconds).ok_or_else(err)
}

fn parse_freq(value: &str) -> Result<Option<Frequency>, TimeParseError> {
    let freq = match value.to_ascii_lowercase().as_str() {
        "daily" => Some(Frequency::Daily),
        "weekly" => Some(Frequency::Weekly),
        "monthly" => Some(Frequency::Monthly),
        "yearly" => Some(Frequency::Yearly),
        "secondly" | "minutely" | "hourly" => {
            tracing::warn!(freq = value, "unsupported recurrence frequency, treating as non-recurring");
            None
        }
        _ => return Err(TimeParseError::new("FREQ", value)),
    };
    Ok(freq)
}

fn parse_weekday(value: &str) -> Option<Weekday> {
    Some(match value.to_ascii_uppercase().as_str() {
        "MO" => Weekday::Mon,
        "TU" => Weekday::Tue,
        "WE" => Weekday::Wed,
        "TH" => Weekday::Thu,
        "FR" => Weekday::Fri,
        "SA" => Weekday::Sat,
        "SU" => Weekday::Sun,
        _ => return None,
    })
}

fn parse_list(
    attribute: &'static str,
    value: &str,
    range: core::ops::RangeInclusive<u32>,
) -> Result<Vec<u32>, TimeParseError> {
    value
        .split(',')
        .map(|item| {
            item.trim()
                .parse::<u32>()
                .ok()
                .filter(|v| range.contains(v))
                .ok_or_else(|| TimeParseError::new(attribute, value))
        })
        .collect()
}

fn parse_signed_list(
    attribute: &'static str,
    value: &str,
    max: i32,
) -> Result<Vec<i32>, TimeParseError> {
    value
        .split(',')
        .map(|item| {
            let item = item.trim();
            item.strip_prefix('+')
                .unwrap_or(item)
                .parse::<i32>()
                .ok()
                .filter(|v| *v != 0 && v.abs() <= max)
                .ok_or_else(|| TimeParseError::new(attribute, value))
        })
        .collect()
}

fn parse_by_day(value: &str) -> Result<Vec<WeekdayRule>, TimeParseError> {
    value
        .split(',')
        .map(|item| {
            let item = item.trim();
            let err = || TimeParseError::new("BYDAY", value);
            let split = item.len().checked_sub(2).ok_or_else(err)?;
            if !item.is_char_boundary(split) {
                return Err(err());
            }
            let (ordinal, day) = item.split_at(split);
            let weekday = parse_weekday(day).ok_or_else(err)?;
            let ordinal = match ordinal {
                "" => 0,
                text => {
                    let text = text.strip_prefix('+').unwrap_or(text);
                    text.parse::<i8>()
                        .ok()
                        .filter(|n| *n != 0 && n.abs() <= 53)
                        .ok_or_else(err)?
                }
            };
            Ok(WeekdayRule { ordinal, weekday })
        })
        .collect()
}

/// 从 TZID 文本解析时区，接受可选的 `TZ=` 前缀。
#[must_use]
pub fn parse_tzid(value: &str) -> Option<Tz> {
    let value = value.trim();
    let name = value.strip_prefix("TZ=").unwrap_or(value);
    name.parse::<Tz>().ok()
}

/// 可替换的时间匹配器。
pub trait TimeMatcher: Send + Sync {
    fn matches(&self, rule: &Recurrence, tz: Tz, at: DateTime<Utc>) -> Result<bool, CollaboratorError>;
}

/// 基于 `chrono-tz` 的默认实现：先换算到本地时间，再做浮动时间匹配。
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTimeMatcher;

impl TimeMatcher for DefaultTimeMatcher {
    fn matches(&self, rule: &Recurrence, tz: Tz, at: DateTime<Utc>) -> Result<bool, CollaboratorError> {
        if !rule.by_set_pos.is_empty() {
            tracing::warn!("BYSETPOS is not evaluated");
        }
        Ok(rule.matches_local(at.with_timezone(&tz).naive_local()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pairs: &[(u16, &str)]) -> Recurrence {
        let mut builder = RecurrenceBuilder::new();
        for (code, value) in pairs {
            assert!(builder.set(*code, value).expect("属性合法"));
        }
        builder.build().expect("规则完整")
    }

    fn at(text: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(text, "%Y%m%dT%H%M%S").expect("测试时间合法")
    }

    #[test]
    fn parses_duration_forms() {
        assert_eq!(parse_duration("PT1H30M"), Ok(TimeDelta::minutes(90)));
        assert_eq!(parse_duration("P1W2D"), Ok(TimeDelta::days(9)));
        assert_eq!(parse_duration("+P1DT2S"), Ok(TimeDelta::seconds(86_402)));
        assert!(parse_duration("P").is_err());
        assert!(parse_duration("-PT1H").is_err());
        assert!(parse_duration("PT1D").is_err());
    }

    #[test]
    fn builder_requires_exactly_one_end() {
        let mut builder = RecurrenceBuilder::new();
        builder.set(attr::DTSTART, "20240101T090000").expect("DTSTART");
        assert!(builder.build().is_err());

        let mut builder = RecurrenceBuilder::new();
        builder.set(attr::DTSTART, "20240101T090000").expect("DTSTART");
        builder.set(attr::DTEND, "20240101T170000").expect("DTEND");
        builder.set(attr::DURATION, "PT8H").expect("DURATION");
        assert!(builder.build().is_err());
    }

    #[test]
    fn weekday_office_hours() {
        // 2024-01-01 是星期一。
        let office = rule(&[
            (attr::DTSTART, "20240101T090000"),
            (attr::DTEND, "20240101T170000"),
            (attr::FREQ, "weekly"),
            (attr::BYDAY, "MO,TU,WE,TH,FR"),
        ]);
        assert!(office.matches_local(at("20240103T100000")));
        assert!(!office.matches_local(at("20240103T180000")));
        assert!(!office.matches_local(at("20240106T100000")));
        assert!(!office.matches_local(at("20231229T100000")));
    }

    #[test]
    fn until_and_interval_bound_the_recurrence() {
        let every_other_day = rule(&[
            (attr::DTSTART, "20240101T000000"),
            (attr::DURATION, "PT1H"),
            (attr::FREQ, "daily"),
            (attr::INTERVAL, "2"),
            (attr::UNTIL, "20240110T000000"),
        ]);
        assert!(every_other_day.matches_local(at("20240103T003000")));
        assert!(!every_other_day.matches_local(at("20240104T003000")));
        assert!(!every_other_day.matches_local(at("20240103T013000")));
        assert!(!every_other_day.matches_local(at("20240113T003000")));
    }

    #[test]
    fn count_is_an_upper_bound() {
        let three_days = rule(&[
            (attr::DTSTART, "20240101T120000"),
            (attr::DURATION, "PT1H"),
            (attr::FREQ, "daily"),
            (attr::COUNT, "3"),
        ]);
        assert!(three_days.matches_local(at("20240103T123000")));
        assert!(!three_days.matches_local(at("20240104T123000")));
    }

    #[test]
    fn last_friday_of_month() {
        let last_friday = rule(&[
            (attr::DTSTART, "20240105T000000"),
            (attr::DURATION, "P1D"),
            (attr::FREQ, "monthly"),
            (attr::BYDAY, "-1FR"),
        ]);
        assert!(last_friday.matches_local(at("20240126T080000")));
        assert!(!last_friday.matches_local(at("20240119T080000")));
        assert!(last_friday.matches_local(at("20240223T080000")));
    }

    #[test]
    fn week_numbers_follow_the_four_day_rule() {
        let monday = Weekday::Mon;
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).expect("日期合法");
        assert_eq!(week_number(d(2024, 1, 1), monday), (1, 52));
        assert_eq!(week_number(d(2021, 1, 1), monday), (53, 53));
        assert_eq!(week_number(d(2024, 12, 30), monday).0, 1);
    }

    #[test]
    fn tzid_accepts_prefix() {
        assert_eq!(parse_tzid("TZ=Europe/Paris"), Some(Tz::Europe__Paris));
        assert_eq!(parse_tzid("America/New_York"), Some(Tz::America__New_York));
        assert_eq!(parse_tzid("Nowhere/Land"), None);
    }
}
