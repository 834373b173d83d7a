use chrono::NaiveDateTime;

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    /// 消息的时刻字段，`HH:MM`
    fn time_of_day(&self) -> String {
        self.now().format("%H:%M").to_string()
    }

    /// 消息的日期字段，`YYYY-MM-DD`
    fn date(&self) -> String {
        self.now().format("%Y-%m-%d").to_string()
    }
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// 固定时间的时钟，测试中用于得到确定的时间戳。
#[derive(Debug, Clone)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
