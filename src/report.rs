//! Report writers: stdout summary, CSV export, Excel workbook with embedded
//! screenshots, and a standalone HTML report. Pure consumers of a finalized
//! `RunReport`; nothing here feeds back into the pipeline.

use crate::pipeline::RunReport;
use crate::probe::ProbeResult;
use crate::{Config, ScreenshotMode};
use anyhow::Result;
use chrono::Local;
use rust_xlsxwriter::{Color, Format, Image, Workbook};
use std::fmt::Write as _;
use std::path::Path;

/// Print the end-of-run summary to stdout.
pub fn print_summary(report: &RunReport, config: &Config) {
    println!("\nresults (summary)");
    println!("----------------------------------------");
    println!(
        "total: {} targets, {} alive, {} unreachable",
        report.total, report.alive, report.dead
    );

    if config.extract_info && !report.categories.is_empty() {
        println!("page categories:");
        let mut categories: Vec<_> = report.categories.iter().collect();
        categories.sort_by_key(|(category, _)| category.label());
        for (category, count) in categories {
            println!("  {category}: {count}");
        }
    }

    match config.screenshot_mode {
        ScreenshotMode::All => println!("screenshots captured: {}", report.screenshot_count),
        ScreenshotMode::AliveOnly => println!(
            "screenshots captured (alive targets): {}",
            report.screenshot_count
        ),
        ScreenshotMode::None => {}
    }

    println!("elapsed: {:.2}s", report.elapsed.as_secs_f64());
}

/// Write one CSV row per result.
pub fn write_csv(report: &RunReport, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "target",
        "classification",
        "status",
        "latency_ms",
        "category",
        "title",
        "message",
        "screenshot",
    ])?;

    for result in &report.results {
        writer.write_record([
            result.target.clone(),
            result.classification.label().to_string(),
            result.http_status.to_string(),
            format!("{:.2}", result.latency.as_secs_f64() * 1000.0),
            result
                .page_category
                .map(|c| c.label().to_string())
                .unwrap_or_default(),
            result.page_title.clone(),
            result.message.clone(),
            result
                .screenshot
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Write an Excel workbook: a results sheet plus a screenshots sheet with
/// the captured images embedded.
pub fn write_xlsx(report: &RunReport, path: &Path, only_alive: bool) -> Result<()> {
    let mut workbook = Workbook::new();

    let header_format = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0xD9D9D9));

    let headers = [
        "target",
        "classification",
        "status",
        "latency (ms)",
        "category",
        "title",
        "message",
        "screenshot",
    ];

    let results = workbook.add_worksheet();
    results.set_name("results")?;
    for (col, header) in headers.iter().enumerate() {
        results.write_string_with_format(0, col as u16, *header, &header_format)?;
    }
    for col in 0..headers.len() {
        results.set_column_width(col as u16, 24)?;
    }
    results.set_freeze_panes(1, 0)?;

    let mut row = 1u32;
    for result in &report.results {
        if only_alive && !result.is_alive {
            continue;
        }
        results.write_string(row, 0, result.target.as_str())?;
        results.write_string(row, 1, result.classification.label())?;
        results.write_number(row, 2, f64::from(result.http_status))?;
        results.write_number(row, 3, result.latency.as_secs_f64() * 1000.0)?;
        results.write_string(
            row,
            4,
            result.page_category.map(|c| c.label()).unwrap_or_default(),
        )?;
        results.write_string(row, 5, result.page_title.as_str())?;
        results.write_string(row, 6, result.message.as_str())?;
        results.write_string(
            row,
            7,
            result
                .screenshot
                .as_ref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "-".to_string()),
        )?;
        row += 1;
    }

    let shots = workbook.add_worksheet();
    shots.set_name("screenshots")?;
    shots.write_string_with_format(0, 0, "target", &header_format)?;
    shots.write_string_with_format(0, 1, "screenshot", &header_format)?;
    shots.set_column_width(0, 40)?;
    shots.set_column_width(1, 160)?;
    shots.set_freeze_panes(1, 0)?;

    let mut shot_row = 1u32;
    for result in &report.results {
        if only_alive && !result.is_alive {
            continue;
        }
        let Some(screenshot) = &result.screenshot else {
            continue;
        };
        shots.write_string(shot_row, 0, result.target.as_str())?;
        if screenshot.exists() {
            let image = Image::new(screenshot)?
                .set_scale_width(0.3)
                .set_scale_height(0.3);
            shots.set_row_height(shot_row, 220)?;
            shots.insert_image(shot_row, 1, &image)?;
        } else {
            shots.write_string(shot_row, 1, "artifact missing")?;
        }
        shot_row += 1;
    }

    workbook.save(path)?;
    Ok(())
}

/// Write a self-contained HTML report with alive/dead filter tabs, a search
/// box, and per-target cards embedding any captured screenshot.
pub fn write_html(report: &RunReport, path: &Path, only_alive: bool) -> Result<()> {
    let shown: Vec<&ProbeResult> = report
        .results
        .iter()
        .filter(|r| !only_alive || r.is_alive)
        .collect();
    let alive = shown.iter().filter(|r| r.is_alive).count();
    let dead = shown.len() - alive;

    let mut html = String::new();
    html.push_str(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>probe report</title>\n<style>\n\
         body { font-family: Arial, sans-serif; margin: 0; padding: 20px; background: #f5f5f5; }\n\
         .container { max-width: 1200px; margin: 0 auto; }\n\
         h1 { color: #333; text-align: center; }\n\
         .summary, .nav, .search { background: #fff; padding: 15px; border-radius: 5px; margin-bottom: 20px; box-shadow: 0 2px 5px rgba(0,0,0,0.1); }\n\
         .nav { display: flex; justify-content: center; }\n\
         .nav-item { margin: 0 15px; padding: 10px 20px; border-radius: 5px; cursor: pointer; font-weight: bold; }\n\
         .nav-item.active { background: #2056dd; color: white; }\n\
         .search input { width: 100%; padding: 10px; border: 2px solid #ddd; border-radius: 5px; font-size: 16px; box-sizing: border-box; }\n\
         .card { background: #fff; margin-bottom: 20px; border-radius: 5px; overflow: hidden; box-shadow: 0 2px 5px rgba(0,0,0,0.1); }\n\
         .card-header { background: #f0f0f0; padding: 15px; }\n\
         .card-header a { color: #2056dd; text-decoration: none; }\n\
         .card-body { padding: 15px; }\n\
         .status-alive { color: green; }\n\
         .status-dead { color: red; }\n\
         .shot { max-width: 100%; height: auto; border: 1px solid #ddd; margin-top: 10px; }\n\
         .hidden { display: none; }\n\
         </style>\n</head>\n<body>\n<div class=\"container\">\n<h1>probe report</h1>\n",
    );

    let _ = write!(
        html,
        "<div class=\"summary\"><p>{} targets probed, {} alive, {} unreachable</p><p>generated {}</p></div>\n\
         <div class=\"nav\">\n\
         <div class=\"nav-item active\" data-filter=\"all\">all ({})</div>\n\
         <div class=\"nav-item\" data-filter=\"alive\">alive ({})</div>\n\
         <div class=\"nav-item\" data-filter=\"dead\">dead ({})</div>\n\
         </div>\n\
         <div class=\"search\"><input id=\"search\" type=\"text\" placeholder=\"filter by target, status code or classification...\"></div>\n",
        shown.len(),
        alive,
        dead,
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        shown.len(),
        alive,
        dead,
    );

    for result in &shown {
        let state = if result.is_alive { "alive" } else { "dead" };
        let status_class = if result.is_alive {
            "status-alive"
        } else {
            "status-dead"
        };
        let _ = write!(
            html,
            "<div class=\"card card-{state}\">\n\
             <div class=\"card-header\"><a href=\"{target}\" target=\"_blank\" rel=\"noopener noreferrer\">{target_text}</a></div>\n\
             <div class=\"card-body\">\n\
             <p><b>status:</b> <span class=\"{status_class}\">{classification}</span></p>\n\
             <p><b>code:</b> {code}</p>\n\
             <p><b>latency:</b> {latency:.2} ms</p>\n\
             <p><b>category:</b> {category}</p>\n\
             <p><b>title:</b> {title}</p>\n\
             <p><b>message:</b> {message}</p>\n",
            state = state,
            target = escape(&result.target),
            target_text = escape(&result.target),
            status_class = status_class,
            classification = result.classification,
            code = result.http_status,
            latency = result.latency.as_secs_f64() * 1000.0,
            category = result
                .page_category
                .map(|c| c.label())
                .unwrap_or("-"),
            title = escape(&result.page_title),
            message = escape(&result.message),
        );

        if let Some(screenshot) = &result.screenshot {
            let _ = write!(
                html,
                "<img class=\"shot\" src=\"{}\" alt=\"screenshot of {}\">\n",
                escape(&screenshot.display().to_string()),
                escape(&result.target),
            );
        }

        html.push_str("</div>\n</div>\n");
    }

    html.push_str(
        "</div>\n<script>\n\
         document.addEventListener('DOMContentLoaded', function() {\n\
           const navItems = document.querySelectorAll('.nav-item');\n\
           const cards = document.querySelectorAll('.card');\n\
           const search = document.getElementById('search');\n\
           let filter = 'all';\n\
           function apply() {\n\
             const term = search.value.toLowerCase();\n\
             cards.forEach(card => {\n\
               const text = card.textContent.toLowerCase();\n\
               const matchesTerm = term === '' || text.includes(term);\n\
               const matchesFilter = filter === 'all' || card.classList.contains('card-' + filter);\n\
               card.classList.toggle('hidden', !(matchesTerm && matchesFilter));\n\
             });\n\
           }\n\
           navItems.forEach(item => item.addEventListener('click', function() {\n\
             navItems.forEach(n => n.classList.remove('active'));\n\
             this.classList.add('active');\n\
             filter = this.getAttribute('data-filter');\n\
             apply();\n\
           }));\n\
           search.addEventListener('input', apply);\n\
         });\n\
         </script>\n</body>\n</html>\n",
    );

    std::fs::write(path, html)?;
    Ok(())
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::Classification;
    use std::collections::HashMap;
    use std::time::Duration;

    fn sample_report() -> RunReport {
        let make = |target: &str, status: u16| {
            let (classification, is_alive) = Classification::from_status(status);
            ProbeResult {
                target: target.to_string(),
                http_status: status,
                classification,
                is_alive,
                message: "OK".to_string(),
                latency: Duration::from_millis(42),
                page_category: None,
                page_title: "Example".to_string(),
                screenshot: None,
            }
        };
        RunReport {
            results: vec![make("https://a.com", 200), make("http://b.com", 404)],
            total: 2,
            alive: 1,
            dead: 1,
            categories: HashMap::new(),
            screenshot_count: 0,
            elapsed: Duration::from_secs(3),
        }
    }

    #[test]
    fn csv_has_header_and_one_row_per_result() {
        let dir = std::env::temp_dir().join(format!("subprobe-report-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("out.csv");

        write_csv(&sample_report(), &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("target,classification,status"));
        assert!(lines[1].contains("https://a.com"));
        assert!(lines[2].contains("not found"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn html_honors_only_alive() {
        let dir = std::env::temp_dir().join(format!("subprobe-html-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("report.html");

        write_html(&sample_report(), &path, true).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("https://a.com"));
        assert!(!content.contains("http://b.com"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn html_escapes_markup() {
        assert_eq!(escape("<b>&\"x\""), "&lt;b&gt;&amp;&quot;x&quot;");
    }
}
