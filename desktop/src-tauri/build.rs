use std::path::Path;

// Platzhalter-Artefakte, damit generate_context! auch ohne Designer-Assets baut
fn write_png_icon(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
  use image::{ImageBuffer, Rgba};
  // 32x32, transparent
  let img: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_pixel(32, 32, Rgba([0, 0, 0, 0]));
  img.save(path)?;
  Ok(())
}

fn write_ico_icon(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
  use ico::{IconDir, IconDirEntry, IconImage, ResourceType};
  let (w, h) = (64u32, 64u32);
  let img = IconImage::from_rgba_data(w, h, vec![0u8; (w * h * 4) as usize]);
  let mut dir = IconDir::new(ResourceType::Icon);
  dir.add_entry(IconDirEntry::encode(&img)?);
  dir.write(std::fs::File::create(path)?)?;
  Ok(())
}

fn write_dist_placeholder(path: &Path) -> std::io::Result<()> {
  let page = "<!doctype html><html><head><meta charset='utf-8'><title>VirenWald</title></head>\
<body style='font-family:Segoe UI, sans-serif; padding:20px;'>Starting VirenWald...</body></html>";
  std::fs::write(path, page)
}

fn main() {
  let _ = std::fs::create_dir_all("icons");
  let _ = std::fs::create_dir_all("dist");

  let png = Path::new("icons/icon.png");
  if !png.exists() {
    if let Err(e) = write_png_icon(png) {
      println!("cargo:warning=failed to write icons/icon.png: {}", e);
    }
  }

  let ico = Path::new("icons/icon.ico");
  if !ico.exists() {
    println!("cargo:warning=icons/icon.ico not found; generating a transparent placeholder");
    if let Err(e) = write_ico_icon(ico) {
      println!("cargo:warning=failed to write icons/icon.ico: {}", e);
    }
  }

  // distDir wird nur beim Start kurz angezeigt, das Fenster lädt danach die Backend-URL
  let index = Path::new("dist/index.html");
  if !index.exists() {
    if let Err(e) = write_dist_placeholder(index) {
      println!("cargo:warning=failed to write dist/index.html: {}", e);
    }
  }

  tauri_build::build();
}
