use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use tokio::fs;

use crate::error::Result;
use crate::types::Diagram;

/// Assemble the final markdown artifact: a table of contents derived
/// from `##`/`###` headings, then the enriched notes with every
/// `See Figure: HH:MM:SS` placeholder that matches an extracted diagram
/// replaced by an image embed. Write failures propagate.
pub async fn assemble_markdown(
    enriched: &str,
    diagrams: &[Diagram],
    output_path: &Path,
) -> Result<PathBuf> {
    let output_dir = output_path.parent().unwrap_or(Path::new("."));
    let rendered = render_markdown(enriched, diagrams, output_dir);

    fs::create_dir_all(output_dir).await?;
    fs::write(output_path, rendered).await?;
    tracing::info!(path = %output_path.display(), "markdown notes written");
    Ok(output_path.to_path_buf())
}

fn render_markdown(enriched: &str, diagrams: &[Diagram], output_dir: &Path) -> String {
    let figure_pattern =
        Regex::new(r"See Figure: (\d{2}:\d{2}:\d{2})").expect("valid figure pattern");
    let diagram_map: HashMap<&str, &Diagram> = diagrams
        .iter()
        .map(|d| (d.timestamp.as_str(), d))
        .collect();

    let mut toc = vec!["# Table of Contents".to_string()];
    let mut content = Vec::new();

    for line in enriched.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            let heading = heading.trim();
            toc.push(format!("- [{}](#{})", heading, anchor(heading)));
        } else if let Some(heading) = line.strip_prefix("### ") {
            let heading = heading.trim();
            toc.push(format!("  - [{}](#{})", heading, anchor(heading)));
        }

        let rewritten = figure_pattern.replace_all(line, |caps: &regex::Captures| {
            match diagram_map.get(&caps[1]) {
                Some(diagram) => {
                    let rel_path = relative_path(&diagram.path, output_dir);
                    format!("\n![]({})\n", rel_path.display())
                }
                // Placeholders without an extracted diagram stay as-is.
                None => caps[0].to_string(),
            }
        });
        content.push(rewritten.into_owned());
    }

    format!("{}\n\n{}", toc.join("\n"), content.join("\n"))
}

fn anchor(heading: &str) -> String {
    heading.to_lowercase().replace(' ', "-")
}

/// `path` expressed relative to `base`, walking up with `..` where the
/// two diverge. Both paths must share their root kind (both relative or
/// both absolute), which holds for diagram paths derived from the
/// output directory.
fn relative_path(path: &Path, base: &Path) -> PathBuf {
    let path_components: Vec<_> = path.components().collect();
    let base_components: Vec<_> = base.components().collect();

    let shared = path_components
        .iter()
        .zip(&base_components)
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in shared..base_components.len() {
        relative.push("..");
    }
    for component in &path_components[shared..] {
        relative.push(component);
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    relative
}
