use std::io::{self, Write};

use crossterm::style::{Color as TermColor, Stylize};

use crate::color::Color;
use crate::element::Element;
use crate::pipeline::AssignmentOutcome;

fn to_term(c: Color) -> TermColor {
    TermColor::Rgb {
        r: c.r,
        g: c.g,
        b: c.b,
    }
}

/// Choose black or white foreground for readable text on the given background.
fn contrast_fg(c: Color) -> TermColor {
    if c.relative_luminance() > 0.4 {
        TermColor::Black
    } else {
        TermColor::White
    }
}

/// Print the assignment as a table: element, hex, swatch, L*, C*, hue and a
/// mark for synthesized colors. Unassigned elements are dimmed.
pub fn render(outcome: &AssignmentOutcome, out: &mut impl Write) -> io::Result<()> {
    let tier = outcome
        .structural_tier()
        .map_or_else(|| "-".to_string(), |t| t.to_string());
    writeln!(
        out,
        "{}",
        format!("{} ({}, {} structure)", outcome.palette, outcome.polarity(), tier).bold()
    )?;
    writeln!(
        out,
        "{:<10} {:<8} {:<9} {:>6} {:>6} {:>6}  {}",
        "element", "hex", "", "L*", "C*", "hue", "derived"
    )?;

    for element in Element::all() {
        let name = format!("{:<10}", element.as_str());
        match outcome.assignment.get(element) {
            Some(rec) => {
                let label = element.role().as_str().rsplit('_').next().unwrap_or("");
                let swatch = format!("{label:^9}")
                    .with(contrast_fg(rec.color()))
                    .on(to_term(rec.color()));
                writeln!(
                    out,
                    "{} {:<8} {} {:>6.1} {:>6.1} {:>6.1}  {}",
                    name.cyan(),
                    rec.hex(),
                    swatch,
                    rec.l(),
                    rec.chroma(),
                    rec.hue(),
                    if rec.derived { "*" } else { "" }
                )?;
            }
            None => writeln!(out, "{} {}", name.dim(), "-".dim())?,
        }
    }

    let missing = outcome.missing();
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|e| e.as_str()).collect();
        writeln!(out, "{}", format!("missing: {}", names.join(", ")).yellow())?;
    }
    out.flush()
}
