//! Warnings emitted through the `log` facade for non-positive-definite input.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, OnceLock};

use blue_combine::analysis::combine;
use blue_combine::{convert_covariance, Matrix, Vector};
use env_logger::{Builder, Target};
use log::LevelFilter;

/// Shared sink for everything the logger writes.
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Capture {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

/// Install the capturing logger once per test binary.
fn logs() -> &'static Capture {
    static CAPTURE: OnceLock<Capture> = OnceLock::new();
    CAPTURE.get_or_init(|| {
        let capture = Capture::default();
        Builder::new()
            .filter_level(LevelFilter::Warn)
            .format(|buf, record| {
                writeln!(buf, "{} {}: {}", record.level(), record.target(), record.args())
            })
            .target(Target::Pipe(Box::new(capture.clone())))
            .try_init()
            .expect("no other logger installed in this binary");
        capture
    })
}

#[test]
fn converter_warns_on_indefinite_covariance() {
    let logs = logs();
    let cov = Matrix::from_row_slice(
        3,
        3,
        &[1.0, 0.9, 0.9, 0.9, 1.0, -0.9, 0.9, -0.9, 1.0],
    );

    let d = convert_covariance(&cov).unwrap();
    assert!(!d.positive_definite);
    let text = logs.contents();
    assert!(
        text.contains("WARN blue_combine::statistics::correlation: covariance matrix (3x3) is not positive definite\n"),
        "captured: {}",
        text
    );
}

#[test]
fn blue_warns_when_inverting_indefinite_covariance() {
    let logs = logs();
    let cov = Matrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
    let y = Vector::from_vec(vec![1.0, 2.0]);

    let r = combine(&y, &cov).unwrap();
    assert!((r.weights.sum() - 1.0).abs() < 1e-12);
    let text = logs.contents();
    assert!(
        text.contains(
            "WARN blue_combine::statistics::linalg: covariance matrix (2x2) is not positive definite; combination may be unphysical"
        ),
        "captured: {}",
        text
    );
}
