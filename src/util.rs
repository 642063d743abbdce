use crate::all::*;

pub fn format_log(
  buf: &mut env_logger::fmt::Formatter,
  record: &log::Record,
) -> std::io::Result<()> {
  use env_logger::fmt::Color::*;
  use log::Level::*;
  let mut style = buf.style();
  style.set_color(match record.level() {
    Error => Red,
    Warn => Rgb(200, 200, 200),
    Info => Green,
    Debug => Magenta,
    Trace => Blue,
  });

  let s = format!("{:30}{}",
    format!("{}:{}",
      record.file().unwrap_or("?"),
      record.line().unwrap_or(0),
    ),
    record.args()
  );
  writeln!(buf, "{}", style.value(s))
}

// Parses points written as `x,y;x,y;...`.
pub fn parse_points(s: &str) -> Result<Vec<Vector2d>> {
  s.split(';')
    .map(|p| p.trim())
    .filter(|p| !p.is_empty())
    .map(|p| {
      let mut it = p.split(',').map(|v| v.trim().parse::<f64>());
      match (it.next(), it.next(), it.next()) {
        (Some(Ok(x)), Some(Ok(y)), None) => Ok(Vector2d::new(x, y)),
        _ => Err(anyhow!("Cannot parse point `{}`, expected `x,y`.", p)),
      }
    })
    .collect()
}

// Median of the values, averaging the two middle ones for even counts.
pub fn median(values: &mut [f64]) -> Option<f64> {
  if values.is_empty() { return None }
  values.sort_by(|a, b| a.total_cmp(b));
  let n = values.len();
  if n % 2 == 1 {
    Some(values[n / 2])
  }
  else {
    Some(0.5 * (values[n / 2 - 1] + values[n / 2]))
  }
}
