use console::{style, StyledObject};

use crate::db::{JobState, JobStatus};

const INDENT_SIZE: usize = 2;

pub trait LineWriter {
    fn write_line(&self, line: &str);
}

#[derive(Clone, Copy)]
pub struct StdoutLineWriter;

impl LineWriter for StdoutLineWriter {
    fn write_line(&self, line: &str) {
        println!("{line}");
    }
}

pub struct BulletPointPrinter<W: LineWriter + Clone> {
    writer: W,
    nesting: usize,
}

impl<W: LineWriter + Clone> BulletPointPrinter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, nesting: 0 }
    }

    pub fn print_item(&self, message: impl std::fmt::Display) {
        let indent = " ".repeat(self.nesting * INDENT_SIZE);
        self.writer.write_line(&format!("{indent}• {message}"));
    }

    pub fn print_none(&self) {
        self.print_item(style("(none)").italic());
    }

    pub fn indent(&self) -> Self {
        Self {
            writer: self.writer.clone(),
            nesting: self.nesting + 1,
        }
    }
}

impl BulletPointPrinter<StdoutLineWriter> {
    pub fn new_stdout() -> Self {
        Self::new(StdoutLineWriter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Message,
}

/// `ERROR in line #3: ...`. Index 0 is about the whole job and has no line number.
pub fn report_line(severity: Severity, index: usize, text: &str) -> String {
    match (severity, index) {
        (Severity::Error, 0) => format!("ERROR: {text}"),
        (Severity::Error, line) => format!("ERROR in line #{line}: {text}"),
        (Severity::Warning, 0) => format!("Warning: {text}"),
        (Severity::Warning, line) => format!("Warning from line #{line}: {text}"),
        (Severity::Message, 0) => format!("Message: {text}"),
        (Severity::Message, line) => format!("Message from line #{line}: {text}"),
    }
}

fn style_report_line(severity: Severity, line: String) -> StyledObject<String> {
    match severity {
        Severity::Error => style(line).red().bold(),
        Severity::Warning => style(line).yellow(),
        Severity::Message => style(line),
    }
}

pub fn style_header(header: &str) -> StyledObject<&str> {
    style(header).bold().underlined()
}

pub fn style_job_state(state: JobState) -> StyledObject<&'static str> {
    let styled = style(state.as_str()).bold();
    match state {
        JobState::Waiting => styled,
        JobState::Running => styled.cyan(),
        JobState::Errored => styled.red(),
        JobState::Done => styled.green(),
    }
}

/// Prints everything a job reported, messages first and errors last
pub fn print_job_report(writer: impl LineWriter, status: &JobStatus) {
    let sections = [
        (Severity::Message, &status.messages),
        (Severity::Warning, &status.warnings),
        (Severity::Error, &status.errors),
    ];
    for (severity, lines) in sections {
        for (index, text) in lines.iter() {
            let line = report_line(severity, index, text);
            writer.write_line(&style_report_line(severity, line).to_string());
        }
    }
}
