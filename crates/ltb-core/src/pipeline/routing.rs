/// Substrings that mark a model name as image-capable (matched case-insensitively).
///
/// Name matching is a heuristic; replace [`route_for`] with a capability table
/// if it misroutes a provider's naming scheme.
pub const MULTIMODAL_MARKERS: [&str; 4] = ["multimodal", "4o", "vision", "turbo-vision"];

/// Backend call shape for a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Text,
    Multimodal,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Route::Text => "text",
            Route::Multimodal => "multimodal",
        }
    }
}

pub fn model_looks_multimodal(model_name: &str) -> bool {
    let lower = model_name.to_lowercase();
    MULTIMODAL_MARKERS.iter().any(|m| lower.contains(m))
}

/// An attached image always forces the multimodal shape; otherwise the model
/// name decides.
pub fn route_for(model_name: &str, has_image: bool) -> Route {
    if has_image || model_looks_multimodal(model_name) {
        Route::Multimodal
    } else {
        Route::Text
    }
}
