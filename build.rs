// build.rs

fn main() {
    // Generate build info (VERGEN_* env vars, read with option_env! at runtime)
    if let Err(e) = vergen::EmitBuilder::builder()
        .all_build()
        .all_git()
        .emit()
    {
        println!("cargo:warning=Unable to generate build info: {e}");
    }
}
