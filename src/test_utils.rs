use std::path::PathBuf;

pub fn get_test_data_path(fname: &str) -> PathBuf {
    let mut pbuf = PathBuf::new();
    pbuf.push(env!("CARGO_MANIFEST_DIR"));
    pbuf.push("test_data");
    pbuf.push(fname);
    pbuf
}

pub fn test_data_text(fname: &str) -> String {
    std::fs::read_to_string(get_test_data_path(fname)).unwrap()
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
