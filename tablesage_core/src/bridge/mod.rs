use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyDict, PyList, PyModule};
use tracing::debug;

use crate::normalize::{TableExtractor, TextExtractor};
use crate::table::RawTable;
use crate::translate::LanguageModel;

/// Prepends `dir` to the interpreter's `sys.path` so local modules import.
pub fn add_search_path(dir: &Path) -> Result<()> {
    let dir = dir
        .to_str()
        .ok_or_else(|| anyhow!("search path {} is not valid UTF-8", dir.display()))?
        .to_string();

    Python::with_gil(|py| {
        let sys = py.import_bound("sys")?;
        let path_attr = sys.getattr("path")?;
        let path = path_attr.downcast::<PyList>()?;
        path.insert(0, dir)?;
        Ok::<(), PyErr>(())
    })
    .map_err(|e: PyErr| anyhow!("Python error: {}", e))
}

/// `None` for Python `None` and NaN, the `str()` of anything else.
fn cell_text(cell: &Bound<'_, PyAny>) -> PyResult<Option<String>> {
    if cell.is_none() {
        return Ok(None);
    }
    if let Ok(f) = cell.extract::<f64>() {
        if f.is_nan() {
            return Ok(None);
        }
    }
    Ok(Some(cell.str()?.to_string()))
}

fn dataframe_to_raw(frame: &Bound<'_, PyAny>) -> PyResult<RawTable> {
    let columns = frame
        .getattr("columns")?
        .call_method0("tolist")?
        .downcast_into::<PyList>()?
        .iter()
        .map(|c| Ok(c.str()?.to_string()))
        .collect::<PyResult<Vec<String>>>()?;

    let mut rows = Vec::new();
    for row in frame
        .getattr("values")?
        .call_method0("tolist")?
        .downcast_into::<PyList>()?
        .iter()
    {
        let cells = row
            .downcast_into::<PyList>()?
            .iter()
            .map(|cell| cell_text(&cell))
            .collect::<PyResult<Vec<_>>>()?;
        rows.push(cells);
    }

    Ok(RawTable::new(columns, rows))
}

/// Table detection through `tabula.read_pdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TabulaExtractor;

impl TableExtractor for TabulaExtractor {
    fn extract_tables(&self, pdf: &[u8]) -> Result<Vec<RawTable>> {
        let mut file = tempfile::Builder::new()
            .prefix("tablesage-")
            .suffix(".pdf")
            .tempfile()
            .context("failed to create temporary PDF file")?;
        file.write_all(pdf)?;
        file.flush()?;
        let path = file
            .path()
            .to_str()
            .ok_or_else(|| anyhow!("temporary path is not valid UTF-8"))?
            .to_string();

        let tables = Python::with_gil(|py| {
            let tabula = PyModule::import_bound(py, "tabula")?;
            let kwargs = PyDict::new_bound(py);
            kwargs.set_item("pages", "all")?;
            kwargs.set_item("multiple_tables", true)?;

            let frames = tabula.getattr("read_pdf")?.call((path,), Some(&kwargs))?;
            frames
                .downcast_into::<PyList>()?
                .iter()
                .map(|frame| dataframe_to_raw(&frame))
                .collect::<PyResult<Vec<_>>>()
        })
        .map_err(|e: PyErr| anyhow!("Python error: {}", e))?;

        debug!(tables = tables.len(), "tabula extraction finished");
        Ok(tables)
    }
}

/// Plain-text extraction through `PyPDF2.PdfReader`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PyPdfTextExtractor;

impl TextExtractor for PyPdfTextExtractor {
    fn extract_text(&self, pdf: &[u8]) -> Result<String> {
        Python::with_gil(|py| {
            let io = PyModule::import_bound(py, "io")?;
            let stream = io.getattr("BytesIO")?.call1((PyBytes::new_bound(py, pdf),))?;
            let reader = PyModule::import_bound(py, "PyPDF2")?
                .getattr("PdfReader")?
                .call1((stream,))?;

            let mut text = String::new();
            for page in reader.getattr("pages")?.iter()? {
                let extracted = page?.call_method0("extract_text")?;
                if !extracted.is_none() {
                    text.push_str(&extracted.extract::<String>()?);
                }
                text.push('\n');
            }
            Ok(text)
        })
        .map_err(|e: PyErr| anyhow!("Python error: {}", e))
    }
}

/// Model implemented in Python as `module.Class().method(prompt) -> str`.
pub struct PythonModel {
    model: PyObject,
    method: String,
}

impl PythonModel {
    pub fn new(module: &str, class: &str, method: &str) -> Result<Self> {
        let model = Python::with_gil(|py| {
            let module = PyModule::import_bound(py, module)?;
            let instance = module.getattr(class)?.call0()?;
            Ok::<PyObject, PyErr>(instance.unbind())
        })
        .map_err(|e: PyErr| anyhow!("Python error: {}", e))?;

        Ok(Self {
            model,
            method: method.to_string(),
        })
    }
}

impl LanguageModel for PythonModel {
    fn complete(&self, prompt: &str) -> Result<String> {
        Python::with_gil(|py| {
            let model = self.model.bind(py);
            let result = model.call_method1(self.method.as_str(), (prompt,))?;
            result.extract::<String>()
        })
        .map_err(|e: PyErr| anyhow!("Python error: {}", e))
    }
}
