use lopdf::{Dictionary as LoDictionary, Document as LoDocument, Object as LoObject};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PdfInspectErrorCode {
    PdfParseFailed,
    PdfIoError,
}

impl PdfInspectErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PdfInspectErrorCode::PdfParseFailed => "PDF_PARSE_FAILED",
            PdfInspectErrorCode::PdfIoError => "PDF_IO_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfInspectError {
    pub code: PdfInspectErrorCode,
    pub message: String,
}

impl std::fmt::Display for PdfInspectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for PdfInspectError {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImagePlacement {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageReport {
    pub number: usize,
    pub width_pt: f32,
    pub height_pt: f32,
    pub images: Vec<ImagePlacement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PdfInspectReport {
    pub pdf_version: String,
    pub page_count: usize,
    pub encrypted: bool,
    pub file_size_bytes: usize,
    pub pages: Vec<PageReport>,
}

pub fn inspect_pdf_bytes(bytes: &[u8]) -> Result<PdfInspectReport, PdfInspectError> {
    let pdf = LoDocument::load_mem(bytes).map_err(|err| PdfInspectError {
        code: PdfInspectErrorCode::PdfParseFailed,
        message: err.to_string(),
    })?;

    let pages = pdf
        .get_pages()
        .into_iter()
        .map(|(number, page_id)| {
            let dict = pdf.get_object(page_id).and_then(LoObject::as_dict).ok();
            page_report(&pdf, number as usize, dict)
        })
        .collect::<Vec<_>>();

    Ok(PdfInspectReport {
        pdf_version: pdf.version.clone(),
        page_count: pages.len(),
        encrypted: pdf.is_encrypted(),
        file_size_bytes: bytes.len(),
        pages,
    })
}

pub fn inspect_pdf_path(path: &Path) -> Result<PdfInspectReport, PdfInspectError> {
    let data = std::fs::read(path).map_err(|err| PdfInspectError {
        code: PdfInspectErrorCode::PdfIoError,
        message: err.to_string(),
    })?;
    inspect_pdf_bytes(&data)
}

fn page_report(doc: &LoDocument, number: usize, page: Option<&LoDictionary>) -> PageReport {
    let mut report = PageReport {
        number,
        width_pt: 0.0,
        height_pt: 0.0,
        images: Vec::new(),
    };
    let Some(page) = page else {
        return report;
    };
    if let Some(media_box) = page
        .get(b"MediaBox")
        .ok()
        .map(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_array().ok())
    {
        let values: Vec<f32> = media_box
            .iter()
            .filter_map(|value| value.as_float().ok())
            .collect();
        if let [x0, y0, x1, y1] = values.as_slice() {
            report.width_pt = (x1 - x0).abs();
            report.height_pt = (y1 - y0).abs();
        }
    }
    let xobjects = page
        .get(b"Resources")
        .ok()
        .map(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|resources| resources.get(b"XObject").ok())
        .map(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_dict().ok());
    let Some(xobjects) = xobjects else {
        return report;
    };
    for (name, obj) in xobjects.iter() {
        let Ok(stream) = resolve(doc, obj).as_stream() else {
            continue;
        };
        let dict = &stream.dict;
        let is_image = dict
            .get(b"Subtype")
            .and_then(LoObject::as_name)
            .map(|subtype| subtype == b"Image")
            .unwrap_or(false);
        if !is_image {
            continue;
        }
        let dimension = |key: &[u8]| {
            dict.get(key)
                .and_then(LoObject::as_i64)
                .map(|value| value.max(0) as u32)
                .unwrap_or(0)
        };
        report.images.push(ImagePlacement {
            name: String::from_utf8_lossy(name).into_owned(),
            width: dimension(b"Width"),
            height: dimension(b"Height"),
            filter: dict
                .get(b"Filter")
                .and_then(LoObject::as_name)
                .ok()
                .map(|filter| String::from_utf8_lossy(filter).into_owned()),
        });
    }
    report
}

fn resolve<'a>(doc: &'a LoDocument, obj: &'a LoObject) -> &'a LoObject {
    match obj {
        LoObject::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}
