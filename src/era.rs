//! Static table of the Japanese eras (元号) recognised in record text.
//!
//! Each era maps to a Gregorian year by a fixed additive offset. The
//! offsets are constants; no check is made that an in-era year actually
//! falls within the era's historical span.

// ── Era ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Era {
    Showa,  // 昭和
    Heisei, // 平成
    Reiwa,  // 令和
}

impl Era {
    pub const ALL: [Era; 3] = [Era::Showa, Era::Heisei, Era::Reiwa];

    pub fn as_japanese(&self) -> &'static str {
        match self {
            Self::Showa => "昭和",
            Self::Heisei => "平成",
            Self::Reiwa => "令和",
        }
    }

    /// Added to the in-era year to get the Gregorian year.
    pub fn offset(&self) -> i32 {
        match self {
            Self::Showa => 1925,
            Self::Heisei => 1988,
            Self::Reiwa => 2018,
        }
    }

    pub fn from_japanese(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_japanese() == name)
    }

    pub fn to_gregorian(&self, era_year: u32) -> i32 {
        era_year as i32 + self.offset()
    }
}

/// Build a regex alternation matching any known era name.
pub fn build_era_regex() -> String {
    let names: Vec<&str> = Era::ALL.iter().map(|e| e.as_japanese()).collect();
    format!("(?:{})", names.join("|"))
}
