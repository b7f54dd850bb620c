//! Presentation adapters over controller state

use crate::controller::ControllerSnapshot;
use crate::history::{response_summary, truncate_prompt};
use crate::model::{Analysis, AnalysisResponse, Document, PromptTemplate};
use crate::notify::{Notifier, Severity};
use crate::progress::ProgressState;
use crate::selection::Comparison;
use colored::Colorize;
use std::io::{self, Write};

/// Something that can draw a [`ControllerSnapshot`].
///
/// Each section has its own hook; `render` draws whatever the snapshot holds.
pub trait View {
    fn render_documents(&mut self, documents: &[Document]) -> io::Result<()>;
    fn render_templates(&mut self, templates: &[PromptTemplate]) -> io::Result<()>;
    fn render_history(&mut self, analyses: &[&Analysis]) -> io::Result<()>;
    fn render_response(&mut self, response: &AnalysisResponse) -> io::Result<()>;
    fn render_comparison(&mut self, comparison: &Comparison) -> io::Result<()>;
    fn render_progress(&mut self, progress: &ProgressState) -> io::Result<()>;

    fn render(&mut self, snapshot: &ControllerSnapshot<'_>) -> io::Result<()> {
        if snapshot.progress.active {
            self.render_progress(&snapshot.progress)?;
        }
        if let Some(response) = snapshot.response {
            self.render_response(response)?;
        }
        if let Some(comparison) = &snapshot.comparison {
            self.render_comparison(comparison)?;
        }
        Ok(())
    }
}

/// Colored text output
pub struct TerminalView<W: Write> {
    out: W,
}

impl TerminalView<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn rule(&mut self, title: &str) -> io::Result<()> {
        writeln!(
            self.out,
            "{} {} {}",
            "──".cyan(),
            title.bold(),
            "──────────────────────────────────────────────".cyan()
        )
    }
}

impl<W: Write> View for TerminalView<W> {
    fn render_documents(&mut self, documents: &[Document]) -> io::Result<()> {
        self.rule("Documents")?;
        if documents.is_empty() {
            return writeln!(self.out, "  {}", "No documents uploaded yet.".dimmed());
        }
        for doc in documents {
            let status = doc.status.as_deref().unwrap_or("");
            writeln!(
                self.out,
                "  {}  {}  {}",
                doc.id.yellow(),
                doc.label(),
                status.dimmed()
            )?;
        }
        Ok(())
    }

    fn render_templates(&mut self, templates: &[PromptTemplate]) -> io::Result<()> {
        self.rule("Prompt templates")?;
        if templates.is_empty() {
            return writeln!(self.out, "  {}", "No templates available.".dimmed());
        }
        for template in templates {
            writeln!(
                self.out,
                "  {}  {}",
                template.id.yellow(),
                template.name.bold()
            )?;
            writeln!(self.out, "      {}", truncate_prompt(&template.content).dimmed())?;
        }
        Ok(())
    }

    fn render_history(&mut self, analyses: &[&Analysis]) -> io::Result<()> {
        self.rule("Analysis history")?;
        if analyses.is_empty() {
            return writeln!(self.out, "  {}", "No analyses yet.".dimmed());
        }
        for analysis in analyses {
            let when = analysis
                .created_at
                .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            writeln!(
                self.out,
                "  {}  {}  {}",
                analysis.id.yellow(),
                when.dimmed(),
                truncate_prompt(analysis.prompt.as_deref().unwrap_or_default())
            )?;
            let summary = response_summary(analysis.response.as_ref());
            if !summary.is_empty() {
                writeln!(self.out, "      {}", summary.green())?;
            }
        }
        Ok(())
    }

    fn render_response(&mut self, response: &AnalysisResponse) -> io::Result<()> {
        self.rule("Analysis result")?;
        for line in response.pretty().lines() {
            writeln!(self.out, "  {}", line.green())?;
        }
        Ok(())
    }

    fn render_comparison(&mut self, comparison: &Comparison) -> io::Result<()> {
        self.rule("Comparison")?;
        for (slot, side) in [("A", &comparison.a), ("B", &comparison.b)] {
            writeln!(
                self.out,
                "{} {}",
                format!("[{}]", slot).cyan().bold(),
                side.id.yellow()
            )?;
            writeln!(self.out, "  {} {}", "Prompt:".dimmed(), side.prompt)?;
            writeln!(self.out, "  {}", "Response:".dimmed())?;
            for line in side.response.lines() {
                writeln!(self.out, "    {}", line)?;
            }
        }
        Ok(())
    }

    fn render_progress(&mut self, progress: &ProgressState) -> io::Result<()> {
        const WIDTH: usize = 30;
        let filled = usize::from(progress.percent) * WIDTH / 100;
        writeln!(
            self.out,
            "  [{}{}] {:>3}% {}",
            "█".repeat(filled).cyan(),
            "░".repeat(WIDTH - filled).dimmed(),
            progress.percent,
            progress.stage.dimmed()
        )
    }
}

/// Prints notifications to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Success => eprintln!("{} {}", "✓".green().bold(), message),
            Severity::Info => eprintln!("{} {}", "ℹ".blue().bold(), message),
            Severity::Error => eprintln!("{} {}", "✗".red().bold(), message.red()),
        }
    }
}
