use std::io::Write;

use crate::aggregate::{AggregationResult, StreamOutcome};
use crate::events::Citation;

/// Receives the events of one turn in arrival order.
pub trait Renderer {
    fn reasoning(&mut self, delta: &str) -> std::io::Result<()>;
    fn text(&mut self, delta: &str) -> std::io::Result<()>;
    /// `index` is 1-based, in discovery order.
    fn citation(&mut self, index: usize, citation: &Citation) -> std::io::Result<()>;
    fn finish(&mut self, result: &AggregationResult) -> std::io::Result<()>;
    /// The turn was cancelled; nothing else will arrive for it.
    fn cancelled(&mut self) -> std::io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Reasoning,
    Text,
}

/// Writes deltas as they arrive, flushing after each so text grows in place.
pub struct TerminalRenderer<W: Write> {
    out: W,
    show_reasoning: bool,
    section: Section,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W, show_reasoning: bool) -> Self {
        Self {
            out,
            show_reasoning,
            section: Section::None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn enter(&mut self, section: Section) -> std::io::Result<()> {
        if self.section == section {
            return Ok(());
        }
        if self.section != Section::None {
            writeln!(self.out, "\n")?;
        }
        if section == Section::Reasoning {
            writeln!(self.out, "Raisonnement du modèle:")?;
        }
        self.section = section;
        Ok(())
    }
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn reasoning(&mut self, delta: &str) -> std::io::Result<()> {
        if !self.show_reasoning {
            return Ok(());
        }
        self.enter(Section::Reasoning)?;
        self.out.write_all(delta.as_bytes())?;
        self.out.flush()
    }

    fn text(&mut self, delta: &str) -> std::io::Result<()> {
        self.enter(Section::Text)?;
        self.out.write_all(delta.as_bytes())?;
        self.out.flush()
    }

    fn citation(&mut self, index: usize, _citation: &Citation) -> std::io::Result<()> {
        // Inline marker; the full reference is listed when the turn finishes.
        write!(self.out, " [{index}]")?;
        self.out.flush()
    }

    fn finish(&mut self, result: &AggregationResult) -> std::io::Result<()> {
        writeln!(self.out)?;

        if !result.citations.is_empty() {
            writeln!(self.out, "\nSources:")?;
            for (i, c) in result.citations.iter().enumerate() {
                writeln!(self.out, "{}. {} <{}>", i + 1, c.title, c.url)?;
            }
        }

        match (&result.cost, &result.usage) {
            (Some(cost), _) if cost.total_cost > 0.0 => writeln!(
                self.out,
                "\nCoût: ${:.6} {} (Entrée: ${:.6}, Sortie: ${:.6})",
                cost.total_cost, cost.currency, cost.input_cost, cost.output_cost
            )?,
            (_, Some(usage)) => writeln!(
                self.out,
                "\nTokens - Entrée: {}, Sortie: {}",
                usage.input_tokens, usage.output_tokens
            )?,
            _ => {}
        }

        if result.outcome == StreamOutcome::Failed {
            let message = result
                .error
                .as_ref()
                .map(|e| e.user_message())
                .unwrap_or_else(|| "unknown error".to_string());
            writeln!(self.out, "\n[erreur: {message}]")?;
        }

        self.section = Section::None;
        self.out.flush()
    }

    fn cancelled(&mut self) -> std::io::Result<()> {
        writeln!(self.out, "\n[annulé]")?;
        self.section = Section::None;
        self.out.flush()
    }
}
