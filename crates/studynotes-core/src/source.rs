/// An ingested document: the uploaded file and the vector store it was
/// indexed into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    pub file_id: String,
    pub filename: String,
    pub vector_store_id: String,
}

/// Distinct vector store ids of `sources`, in first-seen order.
pub fn vector_store_ids(sources: &[DocumentRef]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for source in sources {
        if !ids.contains(&source.vector_store_id) {
            ids.push(source.vector_store_id.clone());
        }
    }
    ids
}

/// Original filename of an uploaded file, if it is one of `sources`.
pub fn filename_for<'a>(sources: &'a [DocumentRef], file_id: &str) -> Option<&'a str> {
    sources
        .iter()
        .find(|s| s.file_id == file_id)
        .map(|s| s.filename.as_str())
}
