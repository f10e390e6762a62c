use anyhow::Result;
use emotia_core::{emoji_for_label, Config, Emotion, EmotionResult};
use tabled::{Table, Tabled};

use super::helpers::{build_gateway, format_score};

#[derive(Tabled)]
struct ScoreRow {
    #[tabled(rename = "")]
    emoji: &'static str,
    #[tabled(rename = "Emotion")]
    label: String,
    #[tabled(rename = "Score")]
    score: String,
}

/// Rows ordered by descending score
fn score_rows(result: &EmotionResult) -> Vec<ScoreRow> {
    let mut scores: Vec<(&String, f64)> = result.scores.iter().map(|(l, s)| (l, *s)).collect();
    scores.sort_by(|a, b| b.1.total_cmp(&a.1));
    scores
        .into_iter()
        .map(|(label, score)| ScoreRow {
            emoji: emoji_for_label(label),
            label: label.to_lowercase(),
            score: format_score(score),
        })
        .collect()
}

pub async fn classify_command(config: &Config, text: &str, json: bool) -> Result<()> {
    let gateway = build_gateway(config)?;
    let result = gateway.classify(text).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!(
        "{} {}",
        emoji_for_label(&result.label),
        result
            .emotion()
            .map_or(result.label.as_str(), |e| Emotion::display_name(e))
    );
    if result.scores.is_empty() {
        return Ok(());
    }
    let table = Table::new(score_rows(&result)).to_string();
    println!("\n{table}");
    Ok(())
}
