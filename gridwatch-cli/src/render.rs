use chrono::{DateTime, Utc};
use gridwatch_core::{IntensitySeries, WeatherSnapshot, nearest_sample};

const BAR_WIDTH: f64 = 30.0;

pub fn weather(w: &WeatherSnapshot) -> String {
    format!(
        "{} - {}\n  {}°C (feels like {}°C), humidity {}%\n  {}\n",
        w.place,
        w.description,
        w.temperature_c.round() as i64,
        w.feels_like_c.round() as i64,
        w.humidity_pct,
        w.icon_url(),
    )
}

pub fn series(series: &IntensitySeries, region_label: &str, now: DateTime<Utc>) -> String {
    if series.is_empty() {
        return "No overlapping carbon intensity data for this window.".to_string();
    }

    let max = series
        .iter()
        .map(|s| s.local_intensity)
        .fold(f64::MIN, f64::max)
        .max(1.0);
    let current = nearest_sample(series, now).ok().map(|s| s.instant);

    let mut out = format!(
        "Carbon intensity (gCO2/kWh)\n{:<16} {:>12} {:>9}\n",
        "Time",
        format!("Your area ({region_label})"),
        "National"
    );

    for sample in series {
        let national = sample
            .national_intensity
            .map(|n| format!("{n:.0}"))
            .unwrap_or_else(|| "-".to_string());
        let bar = "#".repeat(((sample.local_intensity / max) * BAR_WIDTH).round() as usize);
        let marker = if Some(sample.instant) == current { " <- now" } else { "" };

        out.push_str(&format!(
            "{:<16} {:>12.0} {:>9} {}{}\n",
            sample.display_label, sample.local_intensity, national, bar, marker
        ));
    }

    out
}

pub fn tips(text: &str) -> String {
    let mut out = String::from("Your carbon saving tips:\n");
    for line in text.lines() {
        out.push_str("  ");
        out.push_str(line);
        out.push('\n');
    }
    out
}
