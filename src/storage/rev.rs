//! Revision syntax: `branch`, `branch@task_id`, and typed `tr:branch@task_id`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::MirError;
use crate::model::{is_valid_ref_name, TaskId, TvtType};

/// A branch, optionally pinned to the commit tagged with a task id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RevTid {
    pub branch: String,
    pub task_id: Option<TaskId>,
}

impl RevTid {
    pub fn new(branch: impl Into<String>, task_id: Option<TaskId>) -> Self {
        Self {
            branch: branch.into(),
            task_id,
        }
    }

    pub fn branch(branch: impl Into<String>) -> Self {
        Self::new(branch, None)
    }

    /// Name the history store resolves: the tag when pinned, else the branch.
    pub fn history_rev(&self) -> String {
        match &self.task_id {
            Some(tid) => tag_name(&self.branch, tid),
            None => self.branch.clone(),
        }
    }
}

/// Tag name of the commit `task_id` made on `branch`.
pub fn tag_name(branch: &str, task_id: &TaskId) -> String {
    format!("{branch}@{task_id}")
}

impl FromStr for RevTid {
    type Err = MirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (branch, task_id) = match s.split_once('@') {
            Some((branch, tid)) => {
                if !is_valid_ref_name(tid) {
                    return Err(MirError::InvalidBranchOrTag(format!(
                        "invalid task id in revision '{s}'"
                    )));
                }
                (branch, Some(TaskId::new(tid)))
            }
            None => (s, None),
        };
        if !is_valid_ref_name(branch) {
            return Err(MirError::InvalidBranchOrTag(format!(
                "invalid branch in revision '{s}'"
            )));
        }
        Ok(Self::new(branch, task_id))
    }
}

impl fmt::Display for RevTid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.history_rev())
    }
}

/// A revision with an optional split override, as used by merge.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypedRev {
    pub rev: RevTid,
    /// Split stamped onto every asset taken from this revision.
    pub tvt_type: Option<TvtType>,
}

impl TypedRev {
    pub fn new(rev: RevTid, tvt_type: Option<TvtType>) -> Self {
        Self { rev, tvt_type }
    }
}

impl From<RevTid> for TypedRev {
    fn from(rev: RevTid) -> Self {
        Self::new(rev, None)
    }
}

impl FromStr for TypedRev {
    type Err = MirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once(':') {
            Some((prefix, rest)) => {
                let tvt_type = match prefix {
                    "tr" => TvtType::Training,
                    "va" => TvtType::Validation,
                    "te" => TvtType::Test,
                    other => {
                        return Err(MirError::InvalidArgs(format!(
                            "unknown split prefix '{other}' in '{s}' (expected tr, va or te)"
                        )))
                    }
                };
                Ok(Self::new(rest.parse()?, Some(tvt_type)))
            }
            None => Ok(Self::new(s.parse()?, None)),
        }
    }
}

impl fmt::Display for TypedRev {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tvt_type {
            Some(tvt) if tvt != TvtType::Unknown => write!(f, "{}:{}", tvt.prefix(), self.rev),
            _ => write!(f, "{}", self.rev),
        }
    }
}

macro_rules! serde_via_str {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                text.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

serde_via_str!(RevTid);
serde_via_str!(TypedRev);
