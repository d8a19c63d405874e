use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 服のサイズ（小さい順）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SizeLabel {
    #[serde(rename = "XXS")]
    Xxs,
    #[serde(rename = "XS")]
    Xs,
    #[serde(rename = "S")]
    S,
    #[serde(rename = "M")]
    M,
    #[serde(rename = "L")]
    L,
    #[serde(rename = "XL")]
    Xl,
    #[serde(rename = "XXL")]
    Xxl,
    #[serde(rename = "3XL")]
    Xxxl,
    #[serde(rename = "4XL")]
    Xxxxl,
}

impl SizeLabel {
    pub const ALL: [SizeLabel; 9] = [
        SizeLabel::Xxs,
        SizeLabel::Xs,
        SizeLabel::S,
        SizeLabel::M,
        SizeLabel::L,
        SizeLabel::Xl,
        SizeLabel::Xxl,
        SizeLabel::Xxxl,
        SizeLabel::Xxxxl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeLabel::Xxs => "XXS",
            SizeLabel::Xs => "XS",
            SizeLabel::S => "S",
            SizeLabel::M => "M",
            SizeLabel::L => "L",
            SizeLabel::Xl => "XL",
            SizeLabel::Xxl => "XXL",
            SizeLabel::Xxxl => "3XL",
            SizeLabel::Xxxxl => "4XL",
        }
    }

    /// ALL 内の位置
    pub fn rank(&self) -> usize {
        *self as usize
    }

    pub fn from_rank(rank: usize) -> Option<Self> {
        Self::ALL.get(rank).copied()
    }
}

impl fmt::Display for SizeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SizeLabel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let label = match upper.as_str() {
            "XXXL" => SizeLabel::Xxxl,
            "XXXXL" => SizeLabel::Xxxxl,
            other => match Self::ALL.iter().find(|l| l.as_str() == other) {
                Some(label) => *label,
                None => anyhow::bail!("unknown size: {}", s),
            },
        };
        Ok(label)
    }
}
