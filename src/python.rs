//! Python bindings, built with the `python` feature.

use pyo3::{
    exceptions::{PyIOError, PyValueError},
    prelude::*,
};

use crate::{
    error::{ErrorMode, LoadError},
    loader::{load_vocab, load_vocab_expecting},
    tokenizer::Tokenizer,
    types::Token,
};

fn load_err(e: LoadError) -> PyErr {
    match e {
        LoadError::IoFailure { .. } => PyIOError::new_err(e.to_string()),
        _ => PyValueError::new_err(e.to_string()),
    }
}

/// Python wrapper for the tokenizer.
#[pyclass(name = "Tokenizer", frozen)]
pub struct PyTokenizer {
    inner: Tokenizer,
}

#[pymethods]
impl PyTokenizer {
    #[staticmethod]
    #[pyo3(signature = (path, expected_size = None))]
    fn load(path: &str, expected_size: Option<usize>) -> PyResult<Self> {
        let vocab = match expected_size {
            Some(n) => load_vocab_expecting(path, n),
            None => load_vocab(path),
        }
        .map_err(load_err)?;
        Ok(Self {
            inner: Tokenizer::new(vocab),
        })
    }

    #[pyo3(signature = (text, add_bos = true))]
    fn tokenize(&self, text: &str, add_bos: bool) -> Vec<Token> {
        self.inner.tokenize_str(text, add_bos)
    }

    #[pyo3(signature = (data, add_bos = true))]
    fn tokenize_bytes(&self, data: &[u8], add_bos: bool) -> Vec<Token> {
        self.inner.tokenize(data, add_bos)
    }

    #[pyo3(signature = (texts, add_bos = true, show_progress = false))]
    fn tokenize_batch(
        &self,
        py: Python<'_>,
        texts: Vec<String>,
        add_bos: bool,
        show_progress: bool,
    ) -> PyResult<Vec<Vec<Token>>> {
        py.allow_threads(|| self.inner.tokenize_batch(&texts, add_bos, show_progress))
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    #[pyo3(signature = (ids, errors = "strict"))]
    fn decode(&self, ids: Vec<Token>, errors: &str) -> PyResult<String> {
        let mode: ErrorMode = errors.parse().map_err(PyValueError::new_err)?;
        self.inner
            .decode(&ids, mode)
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    fn vocab_size(&self) -> usize {
        self.inner.vocab_size()
    }

    fn bos_id(&self) -> Token {
        self.inner.bos_id()
    }
}

#[pymodule]
fn sptok(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyTokenizer>()?;
    Ok(())
}
