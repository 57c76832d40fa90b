use std::time::Duration;

use espota_core::request::TransferRequest;

/// Formats a byte count into a human-readable string (B, KiB, MiB, GiB).
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    const GIB: u64 = 1024 * MIB;

    if bytes >= GIB {
        format!("{:.2} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.2} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Prints the startup banner with the upload parameters.
///
/// `image_size` is `None` when the image cannot be inspected; the run
/// itself reports why.
pub fn print_banner(request: &TransferRequest, image_size: Option<u64>) {
    let device = format!("{}:{}", request.device_address(), request.device_port());
    let image = format!(
        "{} ({})",
        request.image_path().display(),
        image_size.map_or_else(|| "unknown size".to_owned(), format_size)
    );
    let auth = if request.password().is_empty() {
        "none"
    } else {
        "password"
    };

    println!();
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║                   📡  espota  📡                    ║");
    println!("╠══════════════════════════════════════════════════════╣");
    println!("║  Device  : {device:<41} ║");
    println!("║  Target  : {:<41} ║", request.target().to_string());
    println!("║  Image   : {image:<41} ║");
    println!("║  Listen  : {:<41} ║", request.bind_endpoint());
    println!("║  Auth    : {auth:<41} ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();
}

/// Prints the closing line of a successful run.
pub fn print_success(elapsed: Duration) {
    println!("\n  🎉 Upload finished in {}", format_elapsed(elapsed));
}

/// Prints the closing line of a failed run, with its cause chain.
pub fn print_failure(error: &anyhow::Error) {
    eprintln!("\n  ❌ Upload failed: {error:#}");
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", elapsed.as_secs_f64())
    }
}
