mod path_validator;
mod source_scanner;

pub use path_validator::{ensure_parent_exists, validate_directory_exists, validate_file_exists};
pub use source_scanner::{
    SOURCE_EXTENSIONS, SourceFileInfo, default_output_path, is_source_file, scan_source_files,
};
