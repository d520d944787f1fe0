//!
//! Simulation aware log formatting.
//!
//! The simulator emits its diagnostics through [`tracing`]. Every
//! dispatched event runs inside an `event{time}` span, every process poll
//! inside a nested `process{pid}` span. [`SimFormat`] renders the
//! simulation time of the enclosing event span as a prefix, followed by
//! the level, the span chain, the target and the fields.
//!
//! ```text
//! [ 5 ] DEBUG event{time=5.0}:process{pid=0}: mm1: job done
//! ```
//!
//! The time prefix requires the [`SimClockLayer`] to be part of the
//! subscriber, which [`init`] and [`try_init`] take care of.

use crate::time::SimTime;
use nu_ansi_term::{Color, Style};
use tracing::{
    field::{Field, Visit},
    span::{Attributes, Id},
    Level, Subscriber,
};
use tracing_subscriber::{
    filter::Directive,
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields, FormattedFields},
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Layer,
};

/// The log level that will be used if `RUST_LOG` is not defined.
pub const FALLBACK_LOG_LEVEL: Level = Level::INFO;

/// Creates a new tracing subscriber with a sim formatter and
/// installs it as the global default.
///
/// # Panics
///
/// Panics when subscriber initilization fails.
pub fn init() {
    if let Err(e) = try_init() {
        panic!("failed to install simulation logger: {e}");
    }
}

/// Creates a new tracing subscriber with a sim formatter and
/// installs it as the global default.
///
/// # Errors
///
/// Fails if a global default subscriber was already installed.
pub fn try_init() -> Result<(), TryInitError> {
    tracing_subscriber::fmt()
        .event_format(format())
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Directive::from(FALLBACK_LOG_LEVEL))
                .from_env_lossy(),
        )
        .finish()
        .with(SimClockLayer)
        .try_init()
}

/// Returns the default simulation formatter, with span chain and target.
#[must_use]
pub fn format() -> SimFormat {
    SimFormat::default()
}

/// The simulation time attached to an `event` span.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SimClock(SimTime);

struct TimeVisitor(Option<f64>);

impl Visit for TimeVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        if field.name() == "time" {
            self.0 = Some(value);
        }
    }

    fn record_debug(&mut self, _field: &Field, _value: &dyn std::fmt::Debug) {}
}

///
/// A layer that extracts the simulation time from `event` spans, so that
/// [`SimFormat`] can prefix log lines with it.
///
#[derive(Debug, Clone, Copy, Default)]
pub struct SimClockLayer;

impl<S> Layer<S> for SimClockLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if attrs.metadata().name() != "event" {
            return;
        }

        let mut visitor = TimeVisitor(None);
        attrs.record(&mut visitor);
        if let (Some(time), Some(span)) = (visitor.0, ctx.span(id)) {
            span.extensions_mut().insert(SimClock(SimTime::new(time)));
        }
    }
}

///
/// Renders log lines as `[ time ] LEVEL scope: target: fields`.
///
/// The scope is the chain of enclosing spans with their fields, the
/// time is taken from the innermost `event` span tagged by
/// [`SimClockLayer`]. Lines emitted outside of any event show `-`.
///
#[derive(Debug, Clone, Copy)]
pub struct SimFormat {
    scope: bool,
    target: bool,
}

impl SimFormat {
    /// Omits the span chain from every line.
    #[must_use]
    pub fn without_scope(mut self) -> Self {
        self.scope = false;
        self
    }

    /// Omits the event target from every line.
    #[must_use]
    pub fn without_target(mut self) -> Self {
        self.target = false;
        self
    }

    fn write_clock<S, N>(ctx: &FmtContext<'_, S, N>, out: &mut Painter<'_, '_>) -> std::fmt::Result
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
        N: for<'a> FormatFields<'a> + 'static,
    {
        let clock = ctx.event_scope().and_then(|mut scope| {
            scope.find_map(|span| span.extensions().get::<SimClock>().copied())
        });
        match clock {
            Some(SimClock(time)) => out.paint(Style::new().dimmed(), format_args!("[ {time} ] ")),
            None => out.paint(Style::new().dimmed(), format_args!("[ - ] ")),
        }
    }

    fn write_scope<S, N>(ctx: &FmtContext<'_, S, N>, out: &mut Painter<'_, '_>) -> std::fmt::Result
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
        N: for<'a> FormatFields<'a> + 'static,
    {
        let Some(scope) = ctx.event_scope() else {
            return Ok(());
        };

        let name = Style::new().bold();
        let mut any = false;
        for span in scope.from_root() {
            any = true;
            out.paint(name, format_args!("{}", span.metadata().name()))?;

            let extensions = span.extensions();
            match extensions.get::<FormattedFields<N>>() {
                Some(fields) if !fields.is_empty() => {
                    out.paint(name, format_args!("{{"))?;
                    out.plain(format_args!("{fields}"))?;
                    out.paint(name, format_args!("}}"))?;
                }
                _ => {}
            }
            out.paint(Style::new().dimmed(), format_args!(":"))?;
        }
        if any {
            out.plain(format_args!(" "))?;
        }
        Ok(())
    }
}

impl Default for SimFormat {
    fn default() -> Self {
        Self {
            scope: true,
            target: true,
        }
    }
}

fn level_style(level: Level) -> Style {
    let color = if level == Level::ERROR {
        Color::Red
    } else if level == Level::WARN {
        Color::Yellow
    } else if level == Level::INFO {
        Color::Green
    } else if level == Level::DEBUG {
        Color::Purple
    } else {
        Color::Cyan
    };
    Style::new().fg(color)
}

impl<S, N> FormatEvent<S, N> for SimFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        {
            let mut out = Painter {
                ansi: writer.has_ansi_escapes(),
                writer: &mut writer,
            };

            Self::write_clock(ctx, &mut out)?;
            out.paint(level_style(*meta.level()), format_args!("{} ", meta.level()))?;
            if self.scope {
                Self::write_scope(ctx, &mut out)?;
            }
            if self.target {
                out.paint(Style::new().dimmed(), format_args!("{}: ", meta.target()))?;
            }
        }

        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Writes styled fragments, dropping the styles if the writer has no ANSI support.
struct Painter<'a, 'w> {
    writer: &'a mut Writer<'w>,
    ansi: bool,
}

impl Painter<'_, '_> {
    fn paint(&mut self, style: Style, args: std::fmt::Arguments<'_>) -> std::fmt::Result {
        if self.ansi {
            write!(self.writer, "{}{}{}", style.prefix(), args, style.suffix())
        } else {
            self.writer.write_fmt(args)
        }
    }

    fn plain(&mut self, args: std::fmt::Arguments<'_>) -> std::fmt::Result {
        self.writer.write_fmt(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_colors() {
        assert_eq!(level_style(Level::ERROR), Style::new().fg(Color::Red));
        assert_eq!(level_style(Level::TRACE), Style::new().fg(Color::Cyan));
    }

    #[test]
    fn format_options() {
        let format = format().without_scope();
        assert!(!format.scope);
        assert!(format.target);
        assert!(!format.without_target().target);
    }
}
