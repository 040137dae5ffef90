//! Core data types for division datasets.
//!
//! A division code is a 12-digit positional identifier: two digits for the
//! province, two for the city, two for the county, three for the town and
//! three for the village. The level of a code is the finest segment that is
//! not all zeros.

use std::fmt;
use std::str::FromStr;

/// Width of every division code.
pub const CODE_LEN: usize = 12;

/// Administrative level of a division.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Province, autonomous region or municipality.
    Province,
    /// Prefecture-level city.
    City,
    /// County or district.
    County,
    /// Town, township or subdistrict.
    Town,
    /// Village or neighbourhood committee.
    Village,
}

impl Level {
    pub const ALL: [Level; 5] = [
        Level::Province,
        Level::City,
        Level::County,
        Level::Town,
        Level::Village,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Province => "province",
            Self::City => "city",
            Self::County => "county",
            Self::Town => "town",
            Self::Village => "village",
        }
    }

    /// Number of leading digits that identify a division at this level.
    #[must_use]
    pub fn prefix_len(&self) -> usize {
        match self {
            Self::Province => 2,
            Self::City => 4,
            Self::County => 6,
            Self::Town => 9,
            Self::Village => 12,
        }
    }

    /// The next coarser level, if any.
    #[must_use]
    pub fn parent(&self) -> Option<Level> {
        match self {
            Self::Province => None,
            Self::City => Some(Self::Province),
            Self::County => Some(Self::City),
            Self::Town => Some(Self::County),
            Self::Village => Some(Self::Town),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated 12-digit administrative division code.
///
/// Codes order lexicographically, which equals numeric order since they all
/// have the same width.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DivisionCode(String);

/// Why a string is not a division code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidCode(pub String);

impl fmt::Display for InvalidCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid division code '{}': expected {CODE_LEN} digits",
            self.0
        )
    }
}

impl std::error::Error for InvalidCode {}

impl DivisionCode {
    /// Parse a code, requiring exactly 12 ASCII digits.
    pub fn parse(s: &str) -> Result<Self, InvalidCode> {
        if s.len() == CODE_LEN && s.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(s.to_string()))
        } else {
            Err(InvalidCode(s.to_string()))
        }
    }

    /// Build a code from a level prefix, right-padding with zeros.
    ///
    /// Province pages only link to `11.html`; the province code is the
    /// stem padded to full width.
    pub fn from_prefix(prefix: &str) -> Result<Self, InvalidCode> {
        if prefix.is_empty() || prefix.len() > CODE_LEN {
            return Err(InvalidCode(prefix.to_string()));
        }
        Self::parse(&format!("{prefix:0<width$}", width = CODE_LEN))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn level(&self) -> Level {
        let zeros_from = |i: usize| self.0.as_bytes()[i..].iter().all(|&b| b == b'0');
        if zeros_from(2) {
            Level::Province
        } else if zeros_from(4) {
            Level::City
        } else if zeros_from(6) {
            Level::County
        } else if zeros_from(9) {
            Level::Town
        } else {
            Level::Village
        }
    }

    /// Code of the enclosing division one level up, `None` for provinces.
    #[must_use]
    pub fn parent(&self) -> Option<DivisionCode> {
        let parent_level = self.level().parent()?;
        let prefix = &self.0[..parent_level.prefix_len()];
        Some(Self(format!("{prefix:0<width$}", width = CODE_LEN)))
    }
}

impl fmt::Display for DivisionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DivisionCode {
    type Err = InvalidCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Urban-rural classification of a village-level unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrbanRuralCode {
    /// 111: main urban area.
    MainUrban,
    /// 112: urban-rural fringe.
    UrbanFringe,
    /// 121: town center.
    TownCenter,
    /// 122: town-rural fringe.
    TownFringe,
    /// 123: special area.
    SpecialArea,
    /// 210: township center.
    TownshipCenter,
    /// 220: village.
    Village,
}

impl UrbanRuralCode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MainUrban => "111",
            Self::UrbanFringe => "112",
            Self::TownCenter => "121",
            Self::TownFringe => "122",
            Self::SpecialArea => "123",
            Self::TownshipCenter => "210",
            Self::Village => "220",
        }
    }
}

impl fmt::Display for UrbanRuralCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UrbanRuralCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "111" => Ok(Self::MainUrban),
            "112" => Ok(Self::UrbanFringe),
            "121" => Ok(Self::TownCenter),
            "122" => Ok(Self::TownFringe),
            "123" => Ok(Self::SpecialArea),
            "210" => Ok(Self::TownshipCenter),
            "220" => Ok(Self::Village),
            other => Err(format!("unknown urban-rural code '{other}'")),
        }
    }
}

/// One row of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub code: DivisionCode,
    pub name: String,
    pub urban_rural_code: Option<UrbanRuralCode>,
}

impl Record {
    #[must_use]
    pub fn level(&self) -> Level {
        self.code.level()
    }
}

/// A division whose parent code does not appear in the same dataset.
///
/// The provider's tables have known gaps, so these are reported, not rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyGap {
    pub code: DivisionCode,
    pub missing_parent: DivisionCode,
}
