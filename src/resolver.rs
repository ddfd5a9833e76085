//! Version resolution: pick the installed AEDT release to bind the environment to.
//!
//! Candidates are probed strictly in list order and the first defined one wins,
//! so the list must be ordered newest first.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::debug;

use crate::env::Environment;
use crate::error::LauncherError;

/// Name prefix of the variables set by student installs
pub const STUDENT_PREFIX: &str = "ANSYSEMSV_ROOT";

/// Release label in `YYRZ` form, e.g. `22R1`, or `22R1SV` for a student install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionLabel {
    year: u8,
    release: u8,
    student: bool,
}

impl VersionLabel {
    /// Parse the three-digit `YYZ` token used in variable names.
    fn from_token(token: &str) -> Option<Self> {
        let bytes = token.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_digit) {
            return None;
        }
        Some(Self {
            year: (bytes[0] - b'0') * 10 + (bytes[1] - b'0'),
            release: bytes[2] - b'0',
            student: false,
        })
    }

    /// Whether this labels a student install
    pub fn is_student(&self) -> bool {
        self.student
    }

    /// The `YYZ` token, as it appears at the end of a variable name
    pub fn token(&self) -> String {
        format!("{:02}{}", self.year, self.release)
    }

    /// Dotted release id (`"2022.1"`, `"2022.1SV"` for student installs).
    ///
    /// Releases before 2020 numbered their variables differently: tokens with
    /// a release digit below 3 belong to the previous year, the others are
    /// shifted down by two (`192` is 2018.2, `195` is 2019.3). Year `00` has
    /// no previous year and is kept as is.
    pub fn release_id(&self) -> String {
        let (mut year, mut release) = (self.year, self.release);
        match (year, release) {
            (1..=19, 0..=2) => year -= 1,
            (0..=19, 3..) => release -= 2,
            _ => {}
        }
        let suffix = if self.student { "SV" } else { "" };
        format!("20{:02}.{}{}", year, release, suffix)
    }
}

impl fmt::Display for VersionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}R{}", self.year, self.release)?;
        if self.student {
            f.write_str("SV")?;
        }
        Ok(())
    }
}

impl FromStr for VersionLabel {
    type Err = String;

    /// Accepts `22R1` (case-insensitive) or the bare `221` token, with an
    /// optional `SV` suffix for student installs
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        let (body, student) = match upper.strip_suffix("SV") {
            Some(body) => (body, true),
            None => (upper.as_str(), false),
        };
        let compact: String = body.chars().filter(|c| *c != 'R').collect();
        Self::from_token(&compact)
            .map(|label| Self { student, ..label })
            .ok_or_else(|| format!("`{}` is not a YYRZ version label", s))
    }
}

/// An environment variable that, when defined, points at an AEDT install root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateVariable {
    name: String,
    label: VersionLabel,
}

impl CandidateVariable {
    /// Build a candidate from a name ending in a `YYZ` token.
    ///
    /// Names starting with [`STUDENT_PREFIX`] get a student label.
    pub fn new(name: impl Into<String>) -> Result<Self, LauncherError> {
        let name = name.into();
        let mut label = name
            .len()
            .checked_sub(3)
            .and_then(|start| name.get(start..))
            .and_then(VersionLabel::from_token)
            .ok_or_else(|| LauncherError::InvalidCandidate(name.clone()))?;
        label.student = name.starts_with(STUDENT_PREFIX);
        Ok(Self { name, label })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> VersionLabel {
        self.label
    }
}

/// The winning candidate and what it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInstallation {
    pub variable: String,
    pub label: VersionLabel,
    pub install_path: PathBuf,
}

/// Resolves an installation from an injected candidate list and environment.
#[derive(Debug, Clone)]
pub struct Resolver {
    candidates: Vec<CandidateVariable>,
    minimum_version: String,
}

impl Resolver {
    pub fn new(candidates: Vec<CandidateVariable>, minimum_version: impl Into<String>) -> Self {
        Self {
            candidates,
            minimum_version: minimum_version.into(),
        }
    }

    pub fn candidates(&self) -> &[CandidateVariable] {
        &self.candidates
    }

    /// First defined candidate in priority order
    pub fn resolve(&self, env: &Environment) -> Result<ResolvedInstallation, LauncherError> {
        self.installed(env)
            .next()
            .ok_or_else(|| LauncherError::EnvironmentNotFound {
                minimum_version: self.minimum_version.clone(),
                searched: self.candidates.iter().map(|c| c.name.clone()).collect(),
            })
    }

    /// Resolve one specific release, ignoring priority
    pub fn resolve_version(
        &self,
        env: &Environment,
        label: VersionLabel,
    ) -> Result<ResolvedInstallation, LauncherError> {
        let candidate = self
            .candidates
            .iter()
            .find(|c| c.label == label)
            .ok_or_else(|| LauncherError::VersionNotInstalled {
                label: label.to_string(),
                variable: format!("a candidate ending in {}", label.token()),
            })?;

        Self::probe(candidate, env).ok_or_else(|| LauncherError::VersionNotInstalled {
            label: label.to_string(),
            variable: candidate.name.clone(),
        })
    }

    /// Every defined candidate, in priority order
    pub fn installed<'a>(
        &'a self,
        env: &'a Environment,
    ) -> impl Iterator<Item = ResolvedInstallation> + 'a {
        self.candidates
            .iter()
            .filter_map(move |candidate| Self::probe(candidate, env))
    }

    fn probe(candidate: &CandidateVariable, env: &Environment) -> Option<ResolvedInstallation> {
        let value = env.get(&candidate.name);
        debug!(variable = %candidate.name, defined = value.is_some(), "probing candidate");
        value.map(|path| ResolvedInstallation {
            variable: candidate.name.clone(),
            label: candidate.label,
            install_path: PathBuf::from(path),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAMES: [&str; 4] = [
        "ANSYSEM_ROOT222",
        "ANSYSEM_ROOT221",
        "ANSYSEM_ROOT212",
        "ANSYSEM_ROOT211",
    ];

    fn resolver() -> Resolver {
        let candidates = NAMES
            .iter()
            .map(|name| CandidateVariable::new(*name).unwrap())
            .collect();
        Resolver::new(candidates, "2021 R1")
    }

    #[test]
    fn label_from_variable_suffix() {
        let c = CandidateVariable::new("ANSYSEM_ROOT221").unwrap();
        assert_eq!(c.label().to_string(), "22R1");
        let c = CandidateVariable::new("ANSYSEM_ROOT212").unwrap();
        assert_eq!(c.label().to_string(), "21R2");
    }

    #[test]
    fn rejects_names_without_token() {
        assert!(CandidateVariable::new("ANSYSEM_ROOT").is_err());
        assert!(CandidateVariable::new("ROOT2X1").is_err());
        assert!(CandidateVariable::new("21").is_err());
    }

    #[test]
    fn earliest_listed_wins_for_every_subset() {
        let resolver = resolver();
        // Every non-empty subset of the four candidates
        for mask in 1u8..16 {
            let env: Environment = NAMES
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(i, name)| (*name, format!("/ansys/{}", i)))
                .collect();
            let expected = (0..4).find(|i| mask & (1 << i) != 0).unwrap();
            let resolved = resolver.resolve(&env).unwrap();
            assert_eq!(resolved.variable, NAMES[expected], "mask {:04b}", mask);
            assert_eq!(resolved.install_path, PathBuf::from(format!("/ansys/{}", expected)));
        }
    }

    #[test]
    fn none_defined_is_not_found() {
        let env: Environment = [("ANSYSEM_ROOT221", "")].into_iter().collect();
        match resolver().resolve(&env) {
            Err(LauncherError::EnvironmentNotFound {
                minimum_version,
                searched,
            }) => {
                assert_eq!(minimum_version, "2021 R1");
                assert_eq!(searched, NAMES);
            }
            other => panic!("expected not found, got {:?}", other),
        }
    }

    #[test]
    fn pinned_version_skips_newer_installs() {
        let env: Environment = [
            ("ANSYSEM_ROOT222", "/ansys/v222"),
            ("ANSYSEM_ROOT212", "/ansys/v212"),
        ]
        .into_iter()
        .collect();
        let resolved = resolver()
            .resolve_version(&env, "21R2".parse().unwrap())
            .unwrap();
        assert_eq!(resolved.variable, "ANSYSEM_ROOT212");

        let missing = resolver().resolve_version(&env, "22R1".parse().unwrap());
        assert!(matches!(
            missing,
            Err(LauncherError::VersionNotInstalled { variable, .. }) if variable == "ANSYSEM_ROOT221"
        ));
    }

    #[test]
    fn installed_lists_in_priority_order() {
        let env: Environment = [
            ("ANSYSEM_ROOT211", "/a"),
            ("ANSYSEM_ROOT222", "/b"),
        ]
        .into_iter()
        .collect();
        let labels: Vec<String> = resolver()
            .installed(&env)
            .map(|i| i.label.to_string())
            .collect();
        assert_eq!(labels, ["22R2", "21R1"]);
    }

    #[test]
    fn release_ids() {
        let id = |s: &str| s.parse::<VersionLabel>().unwrap().release_id();
        assert_eq!(id("22R1"), "2022.1");
        assert_eq!(id("201"), "2020.1");
        assert_eq!(id("195"), "2019.3");
        assert_eq!(id("192"), "2018.2");
        assert_eq!(id("22R1SV"), "2022.1SV");
    }

    #[test]
    fn release_id_of_year_zero_does_not_underflow() {
        let id = |name: &str| CandidateVariable::new(name).unwrap().label().release_id();
        assert_eq!(id("ANSYSEM_ROOT001"), "2000.1");
        assert_eq!(id("ANSYSEM_ROOT000"), "2000.0");
        assert_eq!(id("ANSYSEM_ROOT005"), "2000.3");
        assert_eq!(id("ANSYSEM_ROOT011"), "2000.1");
    }

    #[test]
    fn student_variables_get_an_sv_label() {
        let c = CandidateVariable::new("ANSYSEMSV_ROOT221").unwrap();
        assert!(c.label().is_student());
        assert_eq!(c.label().to_string(), "22R1SV");
        assert_eq!(c.label().token(), "221");
        assert!(!CandidateVariable::new("ANSYSEM_ROOT221").unwrap().label().is_student());
    }

    #[test]
    fn pinned_student_version_is_told_apart_from_full_install() {
        let candidates = ["ANSYSEM_ROOT221", "ANSYSEMSV_ROOT221"]
            .iter()
            .map(|name| CandidateVariable::new(*name).unwrap())
            .collect();
        let resolver = Resolver::new(candidates, "2021 R1");
        let env: Environment = [
            ("ANSYSEM_ROOT221", "/ansys/v221"),
            ("ANSYSEMSV_ROOT221", "/ansys/student/v221"),
        ]
        .into_iter()
        .collect();

        let student = resolver
            .resolve_version(&env, "22R1SV".parse().unwrap())
            .unwrap();
        assert_eq!(student.variable, "ANSYSEMSV_ROOT221");
        assert_eq!(student.install_path, PathBuf::from("/ansys/student/v221"));

        let full = resolver
            .resolve_version(&env, "22R1".parse().unwrap())
            .unwrap();
        assert_eq!(full.variable, "ANSYSEM_ROOT221");
    }

    #[test]
    fn label_parsing() {
        assert_eq!("22r1".parse::<VersionLabel>().unwrap().to_string(), "22R1");
        assert_eq!("22r1sv".parse::<VersionLabel>().unwrap().to_string(), "22R1SV");
        assert_eq!("221SV".parse::<VersionLabel>().unwrap().to_string(), "22R1SV");
        assert!("SV".parse::<VersionLabel>().is_err());
        assert!("2022.1".parse::<VersionLabel>().is_err());
        assert!("R".parse::<VersionLabel>().is_err());
    }
}
