//! Ordered, categorised build flag sets.
//!
//! A [`ConfigurationOverlay`] is mutated with [`ConfigurationOverlay::append`]
//! and [`ConfigurationOverlay::replace_matching`] only, and frozen into an
//! [`OverlaySnapshot`] before it reaches a stage.

use crate::errors::{ConfigurationConflictError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The category a flag entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagCategory {
    /// C compiler flags.
    CFlags,
    /// C++ compiler flags.
    CxxFlags,
    /// Linker flags (executables and shared objects).
    LinkerFlags,
    /// Generator arguments (`-DNAME=VALUE` and friends).
    Generator,
}

impl FlagCategory {
    /// The generator options a non-empty category renders into.
    #[must_use]
    pub fn rendered_options(self) -> &'static [&'static str] {
        match self {
            Self::CFlags => &["CMAKE_C_FLAGS"],
            Self::CxxFlags => &["CMAKE_CXX_FLAGS"],
            Self::LinkerFlags => &["CMAKE_EXE_LINKER_FLAGS", "CMAKE_SHARED_LINKER_FLAGS"],
            Self::Generator => &[],
        }
    }
}

impl fmt::Display for FlagCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CFlags => write!(f, "c"),
            Self::CxxFlags => write!(f, "cxx"),
            Self::LinkerFlags => write!(f, "linker"),
            Self::Generator => write!(f, "generator"),
        }
    }
}

/// A single flag with its category and logical option.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlagEntry {
    /// Category.
    pub category: FlagCategory,
    /// Logical option the entry sets, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option: Option<String>,
    /// Literal text passed through.
    pub text: String,
}

impl FlagEntry {
    /// Creates an entry, inferring the logical option from the text.
    #[must_use]
    pub fn new(category: FlagCategory, text: impl Into<String>) -> Self {
        let text = text.into();
        let option = match category {
            FlagCategory::Generator => define_name(&text),
            _ => compiler_option(&text),
        };
        Self { category, option, text }
    }

    /// A generator argument given verbatim.
    #[must_use]
    pub fn generator(text: impl Into<String>) -> Self {
        Self::new(FlagCategory::Generator, text)
    }

    /// A `-DNAME=VALUE` generator definition.
    #[must_use]
    pub fn define(name: &str, value: impl fmt::Display) -> Self {
        Self::generator(format!("-D{name}={value}"))
    }

    /// A list-valued definition joined with `;`.
    #[must_use]
    pub fn define_list<I, S>(name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = values
            .into_iter()
            .map(|v| v.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(";");
        Self::define(name, joined)
    }

    /// A C compiler flag.
    #[must_use]
    pub fn cflag(text: impl Into<String>) -> Self {
        Self::new(FlagCategory::CFlags, text)
    }

    /// A C++ compiler flag.
    #[must_use]
    pub fn cxxflag(text: impl Into<String>) -> Self {
        Self::new(FlagCategory::CxxFlags, text)
    }

    /// A linker flag.
    #[must_use]
    pub fn ldflag(text: impl Into<String>) -> Self {
        Self::new(FlagCategory::LinkerFlags, text)
    }

    /// Overrides the logical option.
    #[must_use]
    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.option = Some(option.into());
        self
    }

    /// Returns true if the entry text matches the pattern.
    #[must_use]
    pub fn matches(&self, pattern: &Regex) -> bool {
        pattern.is_match(&self.text)
    }
}

impl fmt::Display for FlagEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// `-DNAME=VALUE` and `-DNAME:TYPE=VALUE` both set `NAME`.
fn define_name(text: &str) -> Option<String> {
    let body = text.strip_prefix("-D")?;
    let (lhs, _) = body.split_once('=')?;
    let name = lhs.split(':').next().unwrap_or(lhs);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Single-token `-name=value` compiler flags set `name`; others are free-form.
fn compiler_option(text: &str) -> Option<String> {
    if text.contains(char::is_whitespace) || text.contains(',') {
        return None;
    }
    let body = text.strip_prefix('-')?;
    let (name, _) = body.split_once('=')?;
    let name = name.trim_start_matches('-');
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// A mutable, ordered set of flag entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationOverlay {
    entries: Vec<FlagEntry>,
}

impl ConfigurationOverlay {
    /// Creates an empty overlay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an overlay from entries, applying `append` semantics to each.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationConflict` if two entries set the same option.
    pub fn from_entries(entries: impl IntoIterator<Item = FlagEntry>) -> Result<Self> {
        let mut overlay = Self::new();
        overlay.extend(entries)?;
        Ok(overlay)
    }

    /// Appends an entry.
    ///
    /// Returns `Ok(false)` when an identical entry already exists in the same
    /// category; the duplicate is not stored.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationConflict` if the category already holds a
    /// different entry for the same logical option.
    pub fn append(&mut self, entry: FlagEntry) -> Result<bool> {
        let same_category = self.entries.iter().filter(|e| e.category == entry.category);
        for existing in same_category {
            if existing.text == entry.text {
                return Ok(false);
            }
            if let (Some(a), Some(b)) = (&existing.option, &entry.option) {
                if a == b {
                    return Err(ConfigurationConflictError::new(
                        entry.category,
                        a.clone(),
                        existing.text.clone(),
                        entry.text.clone(),
                    )
                    .into());
                }
            }
        }
        self.entries.push(entry);
        Ok(true)
    }

    /// Appends every entry in order.
    ///
    /// # Errors
    ///
    /// Stops at the first `ConfigurationConflict`.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = FlagEntry>) -> Result<()> {
        for entry in entries {
            self.append(entry)?;
        }
        Ok(())
    }

    /// Removes every entry whose text matches `pattern`, then appends `entry`.
    ///
    /// Returns the number of entries removed. A pattern matching nothing
    /// degenerates to a plain append.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is invalid or the append conflicts.
    pub fn replace_matching(&mut self, pattern: &str, entry: FlagEntry) -> Result<usize> {
        let pattern = Regex::new(pattern)?;
        self.replace_matching_regex(&pattern, entry)
    }

    /// [`Self::replace_matching`] with a precompiled pattern.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationConflict` if the append conflicts.
    pub fn replace_matching_regex(&mut self, pattern: &Regex, entry: FlagEntry) -> Result<usize> {
        let before = self.entries.len();
        self.entries.retain(|e| !e.matches(pattern));
        let removed = before - self.entries.len();
        self.append(entry)?;
        Ok(removed)
    }

    /// Overrides a generator definition regardless of its current value.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationConflict` if the append conflicts.
    pub fn override_define(&mut self, name: &str, value: impl fmt::Display) -> Result<usize> {
        let pattern = Regex::new(&format!("^-D{}(:[A-Z]+)?=", regex::escape(name)))?;
        self.replace_matching_regex(&pattern, FlagEntry::define(name, value))
    }

    /// Entries whose text matches `pattern`.
    #[must_use]
    pub fn matching(&self, pattern: &Regex) -> Vec<&FlagEntry> {
        self.entries.iter().filter(|e| e.matches(pattern)).collect()
    }

    /// All entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[FlagEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the overlay holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freezes the current state.
    #[must_use]
    pub fn snapshot(&self) -> OverlaySnapshot {
        OverlaySnapshot {
            entries: Arc::from(self.entries.clone()),
        }
    }
}

/// An immutable view of an overlay handed to a stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlaySnapshot {
    entries: Arc<[FlagEntry]>,
}

impl OverlaySnapshot {
    /// All entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[FlagEntry] {
        &self.entries
    }

    /// Entries of one category.
    pub fn category(&self, category: FlagCategory) -> impl Iterator<Item = &FlagEntry> {
        self.entries.iter().filter(move |e| e.category == category)
    }

    /// Space-joined text of one category.
    #[must_use]
    pub fn joined(&self, category: FlagCategory) -> String {
        self.category(category)
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Returns true if a generator definition for `name` is present.
    #[must_use]
    pub fn defines(&self, name: &str) -> bool {
        self.category(FlagCategory::Generator)
            .any(|e| e.option.as_deref() == Some(name))
    }

    /// Starts a new mutable overlay from this snapshot.
    #[must_use]
    pub fn fork(&self) -> ConfigurationOverlay {
        ConfigurationOverlay {
            entries: self.entries.to_vec(),
        }
    }

    /// Checks that no logical option is set twice.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationConflict` for duplicate options within a
    /// category, or when a generator entry sets an option that a non-empty
    /// compiler/linker category also renders.
    pub fn validate(&self) -> Result<()> {
        for (i, entry) in self.entries.iter().enumerate() {
            let Some(option) = &entry.option else { continue };
            if let Some(other) = self.entries[..i]
                .iter()
                .find(|e| e.category == entry.category && e.option.as_ref() == Some(option))
            {
                return Err(ConfigurationConflictError::new(
                    entry.category,
                    option.clone(),
                    other.text.clone(),
                    entry.text.clone(),
                )
                .into());
            }
        }

        for category in [FlagCategory::CFlags, FlagCategory::CxxFlags, FlagCategory::LinkerFlags] {
            let joined = self.joined(category);
            if joined.is_empty() {
                continue;
            }
            for option in category.rendered_options() {
                if let Some(explicit) = self
                    .category(FlagCategory::Generator)
                    .find(|e| e.option.as_deref() == Some(*option))
                {
                    return Err(ConfigurationConflictError::new(
                        FlagCategory::Generator,
                        *option,
                        explicit.text.clone(),
                        format!("-D{option}={joined}"),
                    )
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Renders the snapshot as generator arguments.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationConflict` if [`Self::validate`] fails.
    pub fn render(&self) -> Result<Vec<String>> {
        self.validate()?;

        let mut args: Vec<String> = self
            .category(FlagCategory::Generator)
            .map(|e| e.text.clone())
            .collect();

        for category in [FlagCategory::CFlags, FlagCategory::CxxFlags, FlagCategory::LinkerFlags] {
            let joined = self.joined(category);
            if joined.is_empty() {
                continue;
            }
            for option in category.rendered_options() {
                args.push(format!("-D{option}={joined}"));
            }
        }
        Ok(args)
    }
}
