#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Status {
    Down,
    Attempt,
    Init,
    TwoWay,
    ExStart,
    Exchange,
    Loading,
    Full,
}

impl Status {
    /// 2-Way and Full are where an adjacency settles.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::TwoWay | Status::Full)
    }
    /// the neighbor takes part in flooding.
    pub fn is_exchanging(&self) -> bool {
        *self >= Status::Exchange
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "down" => Ok(Status::Down),
            "attempt" => Ok(Status::Attempt),
            "init" => Ok(Status::Init),
            "2way" | "twoway" | "2-way" => Ok(Status::TwoWay),
            "exstart" => Ok(Status::ExStart),
            "exchange" => Ok(Status::Exchange),
            "loading" => Ok(Status::Loading),
            "full" => Ok(Status::Full),
            other => Err(format!("unknown neighbor state {}", other)),
        }
    }
}
