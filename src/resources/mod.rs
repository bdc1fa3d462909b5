//! Loading of external assets: images, shader sources and glTF models.
//!
//! On native targets assets are read from `./assets`; on the web they are
//! fetched from `<origin>/assets`. Everything here returns CPU data only, so
//! loaders can run on a worker without touching GPU state.

use anyhow::Context as _;
#[cfg(target_arch = "wasm32")]
use anyhow::anyhow;

use crate::{
    config::SceneConfig,
    data_structures::material::{ShaderSource, TextureImage},
};

pub mod gltf_loader;

#[cfg(target_arch = "wasm32")]
fn format_url(file_name: &str) -> anyhow::Result<reqwest::Url> {
    let window = web_sys::window().ok_or_else(|| anyhow!("no window"))?;
    let origin = window
        .location()
        .origin()
        .map_err(|e| anyhow!("cannot read the page origin: {:?}", e))?;
    let base = reqwest::Url::parse(&format!("{}/assets/", origin))?;
    Ok(base.join(file_name)?)
}

pub async fn load_string(file_name: &str) -> anyhow::Result<String> {
    #[cfg(target_arch = "wasm32")]
    let txt = {
        let url = format_url(file_name)?;
        reqwest::get(url).await?.text().await?
    };
    #[cfg(not(target_arch = "wasm32"))]
    let txt = {
        let path = std::path::Path::new("./").join("assets").join(file_name);
        tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?
    };

    Ok(txt)
}

pub async fn load_binary(file_name: &str) -> anyhow::Result<Vec<u8>> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(file_name)?;
        let response = reqwest::get(url).await?.error_for_status()?;
        response.bytes().await?.to_vec()
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = {
        let path = std::path::Path::new("./").join("assets").join(file_name);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?
    };

    Ok(data)
}

/// Decode an encoded image (PNG, JPEG, ...) into RGBA texels.
pub fn decode_image(bytes: &[u8], label: &str) -> anyhow::Result<TextureImage> {
    let image = image::load_from_memory(bytes)
        .with_context(|| format!("cannot decode image {}", label))?
        .to_rgba8();
    Ok(TextureImage {
        label: label.to_string(),
        image,
    })
}

/// Load an image asset. A missing or broken image is logged and replaced by
/// a single white texel so that the scene still builds.
pub async fn load_texture_image(file_name: &str) -> TextureImage {
    let loaded = match load_binary(file_name).await {
        Ok(bytes) => decode_image(&bytes, file_name),
        Err(e) => Err(e),
    };
    loaded.unwrap_or_else(|e| {
        log::error!("Failed to load texture {}: {:#}", file_name, e);
        TextureImage::placeholder(file_name)
    })
}

/// Read the two opaque shader sources of the custom material.
///
/// On the web they are the text of the page elements with the configured
/// ids; natively they are `assets/shaders/<id>.wgsl`.
pub async fn load_shader_sources(config: &SceneConfig) -> anyhow::Result<ShaderSource> {
    #[cfg(target_arch = "wasm32")]
    {
        let document = web_sys::window()
            .and_then(|window| window.document())
            .ok_or_else(|| anyhow!("no document to read shader sources from"))?;
        let text_of = |id: &str| -> anyhow::Result<String> {
            document
                .get_element_by_id(id)
                .and_then(|element| element.text_content())
                .ok_or_else(|| anyhow!("missing shader element #{}", id))
        };
        Ok(ShaderSource {
            vertex: text_of(config.vertex_shader_id)?,
            fragment: text_of(config.fragment_shader_id)?,
        })
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        let vertex = load_string(&format!("shaders/{}.wgsl", config.vertex_shader_id)).await?;
        let fragment = load_string(&format!("shaders/{}.wgsl", config.fragment_shader_id)).await?;
        Ok(ShaderSource { vertex, fragment })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_png_bytes() {
        let mut bytes = Vec::new();
        image::RgbaImage::from_pixel(2, 3, image::Rgba([10, 20, 30, 255]))
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let decoded = decode_image(&bytes, "tiny.png").unwrap();
        assert_eq!(decoded.image.dimensions(), (2, 3));
        assert_eq!(decoded.label, "tiny.png");
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(decode_image(b"not an image", "broken").is_err());
    }

    #[tokio::test]
    async fn missing_texture_falls_back_to_placeholder() {
        let image = load_texture_image("does/not/exist.jpg").await;
        assert_eq!(image.image.dimensions(), (1, 1));
        assert_eq!(image.label, "does/not/exist.jpg");
    }
}
