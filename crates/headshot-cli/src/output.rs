//! Human-readable and JSON rendering of results.

use std::fmt::Write as _;

use serde::Serialize;

use headshot::{
    BatchReport, FailureReason, InspectionReport, OriginKind, ResolutionOutcome, TargetOutcome,
    TargetResult,
};

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("  Error: could not serialize output: {e}"),
    }
}

/// `1536` → `1.5 KB`.
pub fn format_size(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

pub fn render_result(result: &TargetResult) -> String {
    let mut out = String::new();
    match &result.outcome {
        TargetOutcome::Success {
            path,
            source_url,
            selector_used,
            byte_length,
        } => {
            let _ = writeln!(out, "[OK] {}", result.target_id);
            let _ = writeln!(
                out,
                "     saved:    {} ({})",
                path.display(),
                format_size(*byte_length)
            );
            let _ = writeln!(out, "     selector: {selector_used}");
            let _ = writeln!(out, "     source:   {source_url}");
        }
        TargetOutcome::Failure {
            reason,
            diagnostics,
        } => {
            let _ = writeln!(out, "[!!] {}", result.target_id);
            match reason {
                FailureReason::NotFound {
                    attempted_selectors,
                } => {
                    let _ = writeln!(
                        out,
                        "     reason:   profile image not found; tried {} selector(s):",
                        attempted_selectors.len()
                    );
                    for s in attempted_selectors {
                        let _ = writeln!(out, "       - {s}");
                    }
                }
                other => {
                    let _ = writeln!(out, "     reason:   {other}");
                }
            }
            if let Some(d) = diagnostics {
                match (&d.snapshot_path, &d.snapshot_error) {
                    (Some(p), _) => {
                        let _ = writeln!(out, "     snapshot: {}", p.display());
                    }
                    (None, Some(e)) => {
                        let _ = writeln!(out, "     snapshot: unavailable ({e})");
                    }
                    (None, None) => {}
                }
                if let Some(p) = &d.inventory_path {
                    let _ = writeln!(
                        out,
                        "     images:   {} on page, listed in {}",
                        d.image_inventory.len(),
                        p.display()
                    );
                } else {
                    let _ = writeln!(out, "     images:   {} on page", d.image_inventory.len());
                }
                if d.login_wall_detected {
                    let _ = writeln!(
                        out,
                        "     hint:     the page shows a login form; the profile may not be public"
                    );
                }
            }
        }
    }
    out
}

pub fn render_report(report: &BatchReport) -> String {
    let mut out = String::new();
    for r in &report.results {
        out.push_str(&render_result(r));
    }
    let _ = writeln!(
        out,
        "\n{} of {} succeeded, {} failed",
        report.succeeded(),
        report.len(),
        report.failed()
    );
    out
}

pub fn render_inspection(report: &InspectionReport) -> String {
    let mut out = String::new();
    if let Some(url) = &report.url {
        let _ = writeln!(out, "Page: {url}");
    }
    let _ = writeln!(out, "Selectors:");
    for a in &report.attempts {
        let mark = if a.accepted {
            "OK"
        } else if a.error.is_some() {
            "ER"
        } else {
            "--"
        };
        let _ = writeln!(out, "  [{mark}] {} ({} match)", a.selector, a.matched);
    }
    match &report.outcome {
        ResolutionOutcome::Found(r) => {
            let _ = writeln!(
                out,
                "Found {} image via `{}`: {}",
                match r.origin_kind {
                    OriginKind::Remote => "remote",
                    OriginKind::Inline => "inline",
                },
                r.classifying_selector,
                headshot::truncate_src(&r.source_value)
            );
        }
        ResolutionOutcome::NotFound {
            attempted_selectors,
        } => {
            let _ = writeln!(
                out,
                "Not found after {} selector(s)",
                attempted_selectors.len()
            );
        }
    }
    let _ = writeln!(out, "Images on page: {}", report.image_inventory.len());
    for img in &report.image_inventory {
        let _ = writeln!(
            out,
            "  - src={} alt={} class={}",
            img.src.as_deref().unwrap_or("-"),
            img.alt.as_deref().unwrap_or("-"),
            img.class_names.as_deref().unwrap_or("-")
        );
    }
    if report.login_wall_detected {
        let _ = writeln!(out, "Login form present");
    }
    out
}

pub fn print_result(result: &TargetResult, json: bool) {
    if json {
        print_json(result);
    } else {
        print!("{}", render_result(result));
    }
}

pub fn print_report(report: &BatchReport, json: bool) {
    if json {
        print_json(report);
    } else {
        print!("{}", render_report(report));
    }
}

pub fn print_inspection(report: &InspectionReport, json: bool) {
    if json {
        print_json(report);
    } else {
        print!("{}", render_inspection(report));
    }
}
