//! Terminal render surface: draws a line-chart option as a sparkline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;

use super::{RenderSurface, SurfaceFactory};

const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

pub struct TextSurface {
    width: Arc<AtomicUsize>,
    option: Option<Value>,
    rendered: Option<Vec<String>>,
    released: bool,
}

impl TextSurface {
    /// Lines drawn at the last option push or resize.
    pub fn rendered(&self) -> Option<&[String]> {
        self.rendered.as_deref()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn redraw(&mut self) {
        let width = self.width.load(Ordering::Relaxed).max(1);
        self.rendered = self.option.as_ref().map(|opt| render_option(opt, width));
    }
}

impl RenderSurface for TextSurface {
    fn set_option(&mut self, option: &Value) {
        self.option = Some(option.clone());
        self.redraw();
    }

    fn resize(&mut self) {
        self.redraw();
    }

    fn release(&mut self) {
        self.option = None;
        self.rendered = None;
        self.released = true;
    }
}

/// Creates text surfaces that share one viewport width.
#[derive(Clone)]
pub struct TextSurfaceFactory {
    width: Arc<AtomicUsize>,
}

impl TextSurfaceFactory {
    pub fn new(width: usize) -> Self {
        Self {
            width: Arc::new(AtomicUsize::new(width)),
        }
    }

    /// Takes effect on the next resize of each surface.
    pub fn set_width(&self, width: usize) {
        self.width.store(width, Ordering::Relaxed);
    }
}

impl SurfaceFactory for TextSurfaceFactory {
    type Surface = TextSurface;

    fn init(&mut self, _container: &str) -> TextSurface {
        TextSurface {
            width: self.width.clone(),
            option: None,
            rendered: None,
            released: false,
        }
    }
}

fn render_option(option: &Value, width: usize) -> Vec<String> {
    let title = option["title"]["text"].as_str().unwrap_or("");
    if option["series"][0]["type"] == "bar" {
        return render_bars(title, option);
    }
    let values: Vec<f64> = option["series"][0]["data"]
        .as_array()
        .map(|a| a.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default();
    let labels: Vec<&str> = option["xAxis"]["data"]
        .as_array()
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut lines = vec![title.to_string()];
    if values.is_empty() {
        return lines;
    }
    let sampled = resample(&values, width);
    let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let span = hi - lo;
    let line: String = sampled
        .iter()
        .map(|v| {
            if span <= f64::EPSILON {
                BARS[BARS.len() / 2]
            } else {
                let idx = ((v - lo) / span * (BARS.len() - 1) as f64).round() as usize;
                BARS[idx.min(BARS.len() - 1)]
            }
        })
        .collect();
    lines.push(line);
    lines.push(format!(
        "{} .. {}  low {:.2}  high {:.2}",
        labels.first().copied().unwrap_or(""),
        labels.last().copied().unwrap_or(""),
        lo,
        hi
    ));
    lines
}

/// One `label value` row per category.
fn render_bars(title: &str, option: &Value) -> Vec<String> {
    let labels = option["xAxis"]["data"].as_array().cloned().unwrap_or_default();
    let values = option["series"][0]["data"].as_array().cloned().unwrap_or_default();
    let mut lines = vec![title.to_string()];
    for (label, value) in labels.iter().zip(&values) {
        if let (Some(label), Some(value)) = (label.as_str(), value.as_f64()) {
            lines.push(format!("{:<10} {:>10.4}", label, value));
        }
    }
    lines
}

fn resample(values: &[f64], width: usize) -> Vec<f64> {
    if values.len() <= width {
        return values.to_vec();
    }
    (0..width)
        .map(|i| values[i * values.len() / width])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn option(values: &[f64]) -> Value {
        let labels: Vec<String> = (0..values.len()).map(|i| format!("t{}", i)).collect();
        json!({
            "title": { "text": "TOTAL ACCOUNT VALUE" },
            "xAxis": { "data": labels },
            "series": [{ "data": values }],
        })
    }

    #[test]
    fn test_sparkline_spans_range() {
        let lines = render_option(&option(&[1.0, 2.0, 3.0]), 10);
        assert_eq!(lines[0], "TOTAL ACCOUNT VALUE");
        assert_eq!(lines[1], "▁▅█");
        assert!(lines[2].starts_with("t0 .. t2"));
    }

    #[test]
    fn test_resize_uses_shared_width() {
        let mut factory = TextSurfaceFactory::new(100);
        let mut surface = factory.init("c");
        let values: Vec<f64> = (0..50).map(f64::from).collect();
        surface.set_option(&option(&values));
        assert_eq!(surface.rendered().unwrap()[1].chars().count(), 50);
        factory.set_width(10);
        surface.resize();
        assert_eq!(surface.rendered().unwrap()[1].chars().count(), 10);
    }

    #[test]
    fn test_bar_option_lists_categories() {
        let opt = json!({
            "title": { "text": "MACD" },
            "xAxis": { "data": ["MACD", "Signal", "Histogram"] },
            "series": [{ "type": "bar", "data": [0.5, 0.25, -0.25] }],
        });
        let lines = render_option(&opt, 10);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[3], format!("{:<10} {:>10.4}", "Histogram", -0.25));
    }

    #[test]
    fn test_release_clears_drawing() {
        let mut surface = TextSurfaceFactory::new(10).init("c");
        surface.set_option(&option(&[1.0]));
        surface.release();
        assert!(surface.is_released());
        assert!(surface.rendered().is_none());
    }
}
