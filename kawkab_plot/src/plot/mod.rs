pub mod axes;
pub mod figure;
pub mod pyplot;

pub use axes::Axes;
pub use figure::Figure;
pub use pyplot::PyPlot;

/// Converts a `PyResult` into a `Result<_, Report>`, printing the python
/// traceback on error.
#[macro_export]
macro_rules! pytry {
    ($py:expr, $e:expr) => {{
        match $e {
            Ok(value) => value,
            Err(e) => {
                e.print($py);
                return Err(color_eyre::eyre::eyre!("python error: {:?}", e));
            }
        }
    }};
}

/// Builds a `PyResult<&PyDict>` out of `(key, value)` pairs.
#[macro_export]
macro_rules! pydict {
    ($py:expr, $($pair:expr),* $(,)?) => {{
        let dict = pyo3::types::PyDict::new($py);
        let mut result: pyo3::PyResult<&pyo3::types::PyDict> = Ok(dict);
        $(
            if result.is_ok() {
                let (key, value) = $pair;
                if let Err(e) = dict.set_item(key, value) {
                    result = Err(e);
                }
            }
        )*
        result
    }};
}
