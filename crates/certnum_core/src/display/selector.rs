//! Chooses what the certificate number element shows and forwards it.
//!
//! # Responsibility
//! - Format an issue per its element configuration.
//! - Allocate lazily when the number is requested but not yet assigned.
//! - Produce the editor preview without allocating.
//!
//! # Side effects
//! - `format`/`render` may write a number to the store; rendering is not
//!   always read-only.

use crate::display::config::{DisplayConfig, DisplayMode};
use crate::model::issue::Issue;
use crate::repo::issue_repo::{NumberStore, ScopedNumberStore};
use crate::sequence::allocator::Allocator;
use crate::sequence::error::{SequenceError, SequenceResult};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::{self, Write};

/// Final string handed to a renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayValue(String);

impl DisplayValue {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for DisplayValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Output side of the element: PDF writer, HTML fragment, terminal.
pub trait Renderer {
    fn render_content(&mut self, value: &DisplayValue) -> io::Result<()>;
}

/// Renderer writing the plain value to any `Write` sink.
pub struct TextRenderer<W: Write> {
    sink: W,
}

impl<W: Write> TextRenderer<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

impl<W: Write> Renderer for TextRenderer<W> {
    fn render_content(&mut self, value: &DisplayValue) -> io::Result<()> {
        self.sink.write_all(value.as_str().as_bytes())?;
        self.sink.flush()
    }
}

/// Errors from rendering an element.
#[derive(Debug)]
pub enum DisplayError {
    Sequence(SequenceError),
    Render(io::Error),
}

impl Display for DisplayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequence(err) => write!(f, "{err}"),
            Self::Render(err) => write!(f, "render failed: {err}"),
        }
    }
}

impl Error for DisplayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sequence(err) => Some(err),
            Self::Render(err) => Some(err),
        }
    }
}

impl From<SequenceError> for DisplayError {
    fn from(value: SequenceError) -> Self {
        Self::Sequence(value)
    }
}

impl From<io::Error> for DisplayError {
    fn from(value: io::Error) -> Self {
        Self::Render(value)
    }
}

pub struct DisplaySelector<'s, S> {
    store: &'s S,
    allocator: Allocator<'s, S>,
}

impl<'s, S: ScopedNumberStore> DisplaySelector<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            allocator: Allocator::new(store),
        }
    }

    /// Formats `issue` per `config`.
    ///
    /// With `ShowAllocatedNumber` the number is read from the store, not
    /// from `issue`, so a snapshot taken before a compaction still shows the
    /// current number. An unnumbered issue is assigned first.
    pub fn format(&self, issue: &Issue, config: &DisplayConfig) -> SequenceResult<DisplayValue> {
        match config.mode {
            Some(DisplayMode::ShowAllocatedNumber) => {
                let persisted = self
                    .store
                    .issue_by_id(issue.id)?
                    .and_then(|stored| stored.number);
                let number = match persisted {
                    Some(number) => number,
                    None => self.allocator.assign(issue.id)?,
                };
                Ok(DisplayValue(number.to_string()))
            }
            None => Ok(DisplayValue(issue.code.clone())),
        }
    }

    /// Formats `issue` and forwards the value to `renderer`.
    pub fn render(
        &self,
        issue: &Issue,
        config: &DisplayConfig,
        renderer: &mut dyn Renderer,
    ) -> Result<DisplayValue, DisplayError> {
        let value = self.format(issue, config)?;
        renderer.render_content(&value)?;
        Ok(value)
    }

    /// Editor preview: the next number without allocating, or the sample
    /// code for pass-through.
    pub fn preview(&self, config: &DisplayConfig, sample_code: &str) -> SequenceResult<DisplayValue> {
        match config.mode {
            Some(DisplayMode::ShowAllocatedNumber) => {
                Ok(DisplayValue(self.allocator.peek_next()?.to_string()))
            }
            None => Ok(DisplayValue(sample_code.to_string())),
        }
    }
}
