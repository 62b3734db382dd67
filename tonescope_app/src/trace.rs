//! Coarse text rendering of the display ring, one line per trace.

use tonescope_backend::DisplaySnapshot;

const LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Downsample `snapshot` to `columns` glyphs, scaled so `midpoint ± amplitude`
/// spans the full height.
pub fn render_trace(snapshot: &DisplaySnapshot, columns: usize, amplitude: i32) -> String {
    let len = snapshot.len();
    if len == 0 || columns == 0 {
        return String::new();
    }

    let midpoint = snapshot.format().midpoint();
    let span = f64::from(amplitude.unsigned_abs().max(1)) * 2.0;
    let columns = columns.min(len);

    (0..columns)
        .map(|column| {
            let index = column * len / columns;
            let value = snapshot.sample(index).unwrap_or(midpoint);
            let level = ((value - midpoint) / span + 0.5).clamp(0.0, 1.0);
            LEVELS[(level * (LEVELS.len() - 1) as f64).round() as usize]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonescope_backend::DisplayBuffer;
    use tonescope_core::SampleFormat;

    #[test]
    fn test_flat_signal_renders_mid_level() {
        let buffer = DisplayBuffer::new(8, SampleFormat::U8).unwrap();
        for _ in 0..8 {
            buffer.write(&[128]).unwrap();
        }
        let line = render_trace(&buffer.snapshot(), 4, 100);
        assert_eq!(line.chars().count(), 4);
        assert!(line.chars().all(|c| c == '▅'));
    }

    #[test]
    fn test_extremes_hit_top_and_bottom() {
        let buffer = DisplayBuffer::new(2, SampleFormat::S16).unwrap();
        buffer.write(&100i16.to_ne_bytes()).unwrap();
        buffer.write(&(-100i16).to_ne_bytes()).unwrap();
        let line: Vec<char> = render_trace(&buffer.snapshot(), 2, 100).chars().collect();
        assert_eq!(line, vec!['█', '▁']);
    }

    #[test]
    fn test_columns_capped_by_length() {
        let buffer = DisplayBuffer::new(3, SampleFormat::U8).unwrap();
        assert_eq!(render_trace(&buffer.snapshot(), 64, 120).chars().count(), 3);
        assert_eq!(render_trace(&buffer.snapshot(), 0, 120), "");
    }
}
