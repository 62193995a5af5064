//! Key-file configuration.
//!
//! Format: `[ group name ]` headers followed by `key: value` lines.  `#`
//! starts a comment, blank lines are ignored, and both group names and keys
//! are matched case-insensitively with surrounding whitespace trimmed.
//! Groups may repeat (one `[ river ]` group per river, for example).

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::angle::deg_to_rad;
use crate::deposit::DepositionPolicy;
use crate::error::ConfigError;
use crate::hydro::HydroRecord;

// ── Key-file ──────────────────────────────────────────────────────────────────

/// One `[ group ]` block, entries in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub name: String,
    entries: Vec<(String, String)>,
}

impl Group {
    pub fn new(name: &str) -> Self {
        Self { name: canonical(name), entries: Vec::new() }
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        let key = canonical(key);
        let value = value.trim().to_string();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn raw(&self, key: &str) -> Option<&str> {
        let key = canonical(key);
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.raw(key).is_some()
    }

    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.raw(key).ok_or_else(|| ConfigError::MissingKey {
            group: self.name.clone(),
            key: key.to_string(),
        })
    }

    fn bad(&self, key: &str, value: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::BadValue {
            group: self.name.clone(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Parse a required scalar.
    pub fn get<T>(&self, key: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.require(key)?;
        raw.parse::<T>().map_err(|e| self.bad(key, raw, e.to_string()))
    }

    /// Parse an optional scalar, falling back to `default` when absent.
    pub fn get_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        if self.has(key) { self.get(key) } else { Ok(default) }
    }

    /// `yes`/`no` (also `true`/`false`, `on`/`off`, `1`/`0`).
    pub fn get_bool(&self, key: &str) -> Result<bool, ConfigError> {
        let raw = self.require(key)?;
        parse_bool(raw).ok_or_else(|| self.bad(key, raw, "expected yes or no"))
    }

    /// Comma-separated list.
    pub fn get_list<T>(&self, key: &str) -> Result<Vec<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.require(key)?;
        raw.split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<T>().map_err(|e| self.bad(key, raw, e.to_string())))
            .collect()
    }

    /// Exactly two comma-separated values.
    pub fn get_pair<T>(&self, key: &str) -> Result<(T, T), ConfigError>
    where
        T: FromStr + Copy,
        T::Err: std::fmt::Display,
    {
        let list: Vec<T> = self.get_list(key)?;
        match list.as_slice() {
            [a, b] => Ok((*a, *b)),
            _ => {
                let raw = self.require(key)?;
                Err(self.bad(key, raw, format!("expected 2 values, found {}", list.len())))
            }
        }
    }
}

/// A parsed key-file: ordered groups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyFile {
    pub groups: Vec<Group>,
}

impl KeyFile {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut groups: Vec<Group> = Vec::new();
        for (n, raw_line) in text.lines().enumerate() {
            let line_no = n + 1;
            let line = match raw_line.find('#') {
                Some(i) => &raw_line[..i],
                None => raw_line,
            }
            .trim();
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix('[') {
                let name = rest.strip_suffix(']').ok_or_else(|| ConfigError::Syntax {
                    line: line_no,
                    message: format!("unterminated group header '{line}'"),
                })?;
                if name.trim().is_empty() {
                    return Err(ConfigError::Syntax {
                        line: line_no,
                        message: "empty group name".into(),
                    });
                }
                groups.push(Group::new(name));
                continue;
            }
            let (key, value) = line.split_once(':').ok_or_else(|| ConfigError::Syntax {
                line: line_no,
                message: format!("expected 'key: value', found '{line}'"),
            })?;
            let group = groups.last_mut().ok_or_else(|| ConfigError::Syntax {
                line: line_no,
                message: "key before any [ group ] header".into(),
            })?;
            group.insert(key, value);
        }
        Ok(Self { groups })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// First group with the given name.
    pub fn group(&self, name: &str) -> Result<&Group, ConfigError> {
        let name = canonical(name);
        self.groups
            .iter()
            .find(|g| g.name == name)
            .ok_or(ConfigError::MissingGroup { group: name })
    }

    /// Every group with the given name, in file order.
    pub fn groups_named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Group> + 'a {
        let name = canonical(name);
        self.groups.iter().filter(move |g| g.name == name)
    }
}

fn canonical(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "yes" | "true" | "on" | "1" => Some(true),
        "no" | "false" | "off" | "0" => Some(false),
        _ => None,
    }
}

// ── River configuration ───────────────────────────────────────────────────────

pub const KEY_STD_DEV: &str = "standard deviation";
pub const KEY_MIN_ANGLE: &str = "minimum angle (degrees)";
pub const KEY_MAX_ANGLE: &str = "maximum angle (degrees)";
pub const KEY_HINGE: &str = "hinge point";
pub const KEY_SEED: &str = "seed for random number generator";
pub const KEY_BRANCH: &str = "river can branch?";

/// Parameters for one river, angles already converted to radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiverConfig {
    /// Per-tick standard deviation (radians).
    pub std_dev: f64,
    pub angle_min: f64,
    pub angle_max: f64,
    /// Initial angle; mid-range when not given.
    pub angle_start: Option<f64>,
    pub hinge: (usize, usize),
    pub seed: u64,
    pub can_branch: bool,
    pub hydro: HydroRecord,
}

impl RiverConfig {
    /// Read one river from a key-file group.  The standard deviation and
    /// angle keys are in degrees.
    pub fn from_group(g: &Group) -> Result<Self, ConfigError> {
        let std_dev_deg: f64 = g.get(KEY_STD_DEV)?;
        let min_deg: f64 = g.get(KEY_MIN_ANGLE)?;
        let max_deg: f64 = g.get(KEY_MAX_ANGLE)?;
        if min_deg > max_deg {
            return Err(ConfigError::BadValue {
                group: g.name.clone(),
                key: KEY_MAX_ANGLE.into(),
                value: max_deg.to_string(),
                reason: format!("smaller than minimum angle {min_deg}"),
            });
        }
        let hinge: (usize, usize) = g.get_pair(KEY_HINGE)?;
        let seed: u64 = g.get(KEY_SEED)?;
        let can_branch = g.get_bool(KEY_BRANCH)?;
        let angle_start = if g.has("starting angle (degrees)") {
            Some(deg_to_rad(g.get::<f64>("starting angle (degrees)")?))
        } else {
            None
        };

        let defaults = HydroRecord::default();
        let hydro = HydroRecord {
            velocity: g.get_or("velocity (m/s)", defaults.velocity)?,
            width: g.get_or("width (m)", defaults.width)?,
            depth: g.get_or("depth (m)", defaults.depth)?,
            bedload: g.get_or("bedload flux (kg/s)", defaults.bedload)?,
            conc: if g.has("suspended concentration (kg/m^3)") {
                g.get_list("suspended concentration (kg/m^3)")?
            } else {
                defaults.conc
            },
        };

        Ok(Self {
            std_dev: deg_to_rad(std_dev_deg),
            angle_min: deg_to_rad(min_deg),
            angle_max: deg_to_rad(max_deg),
            angle_start,
            hinge,
            seed,
            can_branch,
            hydro,
        })
    }

    /// Every `[ river ]` group of a key-file; the `[ avulsion ]` group is
    /// accepted as a single-river file.
    pub fn all_from_key_file(kf: &KeyFile) -> Result<Vec<Self>, ConfigError> {
        let rivers: Vec<Self> = kf
            .groups_named("river")
            .map(Self::from_group)
            .collect::<Result<_, _>>()?;
        if !rivers.is_empty() {
            return Ok(rivers);
        }
        Ok(vec![Self::from_group(kf.group("avulsion")?)?])
    }
}

// ── Simulation configuration ─────────────────────────────────────────────────

/// Cube and engine settings shared by every river.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub nx: usize,
    pub ny: usize,
    /// Along-shore spacing (m).
    pub x_res: f64,
    /// Cross-shore spacing (m).
    pub y_res: f64,
    /// Vertical bin size used when re-binning columns (m).
    pub z_res: f64,
    pub sea_level: f64,
    /// Rivers closer than this (radians) are merged.
    pub merge_threshold: f64,
    /// Gaps wider than this (radians) receive a new river.
    pub split_threshold: f64,
    /// Fraction of the neighbours' discharge given to a new branch.
    pub split_fraction: f64,
    /// Global angle walls used by the split pass.
    pub angle_min: f64,
    pub angle_max: f64,
    /// Seconds per tick.
    pub dt: f64,
    pub deposition: DepositionPolicy,
    /// Run compaction every `n` ticks; 0 disables it.
    pub compaction_interval: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            nx: 40,
            ny: 30,
            x_res: 1000.0,
            y_res: 1000.0,
            z_res: 1.0,
            sea_level: 0.0,
            merge_threshold: deg_to_rad(5.0),
            split_threshold: deg_to_rad(30.0),
            split_fraction: 0.25,
            angle_min: deg_to_rad(0.0),
            angle_max: deg_to_rad(180.0),
            dt: 86_400.0,
            deposition: DepositionPolicy::default(),
            compaction_interval: 0,
        }
    }
}

impl SimulationConfig {
    /// Override defaults from an optional `[ simulation ]` group.
    pub fn from_key_file(kf: &KeyFile) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        let Ok(g) = kf.group("simulation") else {
            return Ok(cfg);
        };
        cfg.nx = g.get_or("number of columns in x", cfg.nx)?;
        cfg.ny = g.get_or("number of columns in y", cfg.ny)?;
        cfg.x_res = g.get_or("x resolution (m)", cfg.x_res)?;
        cfg.y_res = g.get_or("y resolution (m)", cfg.y_res)?;
        cfg.z_res = g.get_or("z resolution (m)", cfg.z_res)?;
        cfg.sea_level = g.get_or("sea level (m)", cfg.sea_level)?;
        cfg.merge_threshold =
            deg_to_rad(g.get_or("merge threshold (degrees)", cfg.merge_threshold.to_degrees())?);
        cfg.split_threshold =
            deg_to_rad(g.get_or("split threshold (degrees)", cfg.split_threshold.to_degrees())?);
        cfg.split_fraction = g.get_or("split fraction", cfg.split_fraction)?;
        cfg.angle_min = deg_to_rad(g.get_or("minimum angle (degrees)", cfg.angle_min.to_degrees())?);
        cfg.angle_max = deg_to_rad(g.get_or("maximum angle (degrees)", cfg.angle_max.to_degrees())?);
        cfg.dt = g.get_or("time step (s)", cfg.dt)?;
        cfg.compaction_interval = g.get_or("compaction interval", cfg.compaction_interval)?;
        cfg.deposition = deposition_from_group(g)?;
        Ok(cfg)
    }
}

/// `deposition policy` is one of `fixed`, `random split` or `hydrology`;
/// the first two need `deposit thickness (m)`.  A thickness on its own
/// selects `fixed`.
fn deposition_from_group(g: &Group) -> Result<DepositionPolicy, ConfigError> {
    const KEY_POLICY: &str = "deposition policy";
    const KEY_THICKNESS: &str = "deposit thickness (m)";
    let Some(raw) = g.raw(KEY_POLICY) else {
        return Ok(if g.has(KEY_THICKNESS) {
            DepositionPolicy::Fixed { thickness: g.get(KEY_THICKNESS)? }
        } else {
            DepositionPolicy::default()
        });
    };
    let name = raw.to_ascii_lowercase().replace(['_', '-'], " ");
    match name.split_whitespace().collect::<Vec<_>>().join(" ").as_str() {
        "fixed" => Ok(DepositionPolicy::Fixed { thickness: g.get(KEY_THICKNESS)? }),
        "random split" => Ok(DepositionPolicy::RandomSplit { thickness: g.get(KEY_THICKNESS)? }),
        "hydrology" => Ok(DepositionPolicy::Hydrology),
        _ => Err(g.bad(KEY_POLICY, raw, "expected fixed, random split or hydrology")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RIVER_FILE: &str = "\
# two rivers sharing a coast
[ river ]
standard deviation:              0.75
minimum angle (degrees):         60
maximum angle (degrees):         120
hinge point:                     20, 0
seed for random number generator: 1945
river can branch?:               no

[ River ]
Standard Deviation: 1.5
minimum angle (degrees): 10
maximum angle (degrees): 80
hinge point: 5,0
seed for random number generator: 7
river can branch?: yes
width (m): 250
suspended concentration (kg/m^3): 0.5, 0.25
";

    #[test]
    fn parses_repeated_groups_case_insensitively() {
        let kf = KeyFile::parse(RIVER_FILE).unwrap();
        let rivers = RiverConfig::all_from_key_file(&kf).unwrap();
        assert_eq!(rivers.len(), 2);
        assert_eq!(rivers[0].hinge, (20, 0));
        assert_eq!(rivers[0].seed, 1945);
        assert!(!rivers[0].can_branch);
        assert!((rivers[0].std_dev - 0.75_f64.to_radians()).abs() < 1e-12);
        assert!(rivers[1].can_branch);
        assert_eq!(rivers[1].hydro.width, 250.0);
        assert_eq!(rivers[1].hydro.conc, vec![0.5, 0.25]);
    }

    #[test]
    fn missing_key_names_group_and_key() {
        let kf = KeyFile::parse("[ river ]\nhinge point: 1, 2\n").unwrap();
        let err = RiverConfig::from_group(&kf.groups[0]).unwrap_err();
        match err {
            ConfigError::MissingKey { group, key } => {
                assert_eq!(group, "river");
                assert_eq!(key, KEY_STD_DEV);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn bad_number_is_reported() {
        let kf = KeyFile::parse("[ a ]\nx: twelve\n").unwrap();
        let err = kf.groups[0].get::<f64>("x").unwrap_err();
        assert!(matches!(err, ConfigError::BadValue { .. }), "{err:?}");
    }

    #[test]
    fn key_outside_group_is_syntax_error() {
        let err = KeyFile::parse("x: 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Syntax { line: 1, .. }), "{err:?}");
    }

    #[test]
    fn pair_needs_two_values() {
        let kf = KeyFile::parse("[ a ]\nhinge point: 1, 2, 3\n").unwrap();
        assert!(kf.groups[0].get_pair::<usize>("hinge point").is_err());
    }

    #[test]
    fn simulation_group_overrides_defaults() {
        let kf = KeyFile::parse(
            "[ simulation ]\nnumber of columns in x: 12\nmerge threshold (degrees): 2\n",
        )
        .unwrap();
        let cfg = SimulationConfig::from_key_file(&kf).unwrap();
        assert_eq!(cfg.nx, 12);
        assert_eq!(cfg.ny, SimulationConfig::default().ny);
        assert!((cfg.merge_threshold - 2.0_f64.to_radians()).abs() < 1e-12);
    }

    #[test]
    fn deposition_policy_is_selectable() {
        let policy = |body: &str| {
            let kf = KeyFile::parse(&format!("[ simulation ]\n{body}")).unwrap();
            SimulationConfig::from_key_file(&kf).map(|c| c.deposition)
        };
        assert_eq!(
            policy("deposition policy: Random Split\ndeposit thickness (m): 3\n").unwrap(),
            DepositionPolicy::RandomSplit { thickness: 3.0 }
        );
        assert_eq!(
            policy("deposition policy: hydrology\n").unwrap(),
            DepositionPolicy::Hydrology
        );
        assert_eq!(
            policy("deposit thickness (m): 0.5\n").unwrap(),
            DepositionPolicy::Fixed { thickness: 0.5 }
        );
        assert!(matches!(
            policy("deposition policy: fixed\n"),
            Err(ConfigError::MissingKey { .. })
        ));
        assert!(matches!(
            policy("deposition policy: sideways\n"),
            Err(ConfigError::BadValue { .. })
        ));
    }

    #[test]
    fn inverted_angle_bounds_rejected() {
        let kf = KeyFile::parse(
            "[ river ]\nstandard deviation: 1\nminimum angle (degrees): 90\n\
             maximum angle (degrees): 10\nhinge point: 0,0\n\
             seed for random number generator: 1\nriver can branch?: no\n",
        )
        .unwrap();
        assert!(RiverConfig::from_group(&kf.groups[0]).is_err());
    }
}
