//! Hand-off to web viewers: a CORS-enabled file server plus Avivator and
//! Neuroglancer links pointing at it.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use axum::Router;
use serde_json::{Map, Value, json};
use tower_http::{cors::CorsLayer, services::ServeDir};
use url::Url;

use crate::{
    Error, Result,
    layers::{Layer, LayerKind, LayerSource},
    metadata::FULL_RESOLUTION_PATH,
    storage::child_path,
};

pub const AVIVATOR_URL: &str = "https://avivator.gehlenborglab.org/";
pub const NEUROGLANCER_URL: &str = "https://neuroglancer-demo.appspot.com/";

/// Route under which served files are exposed.
pub const DATA_ROUTE: &str = "/data";

/// Base URL of files served from `host:port`, with a trailing slash.
pub fn data_base_url(host: &str, port: u16) -> Result<Url> {
    Url::parse(&format!("http://{host}:{port}{DATA_ROUTE}/")).map_err(Error::wrap)
}

/// URL of `relative` (a `/`-separated path) below `base`; segments are percent-encoded.
pub fn served_url(base: &Url, relative: &str) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| Error::general(format!("{base} cannot be a base URL")))?;
        segments.pop_if_empty();
        for part in relative.split('/').filter(|p| !p.is_empty()) {
            segments.push(part);
        }
    }
    Ok(url)
}

/// Avivator link which loads the OME-TIFF at `image_url`.
pub fn avivator_url(image_url: &Url) -> Result<Url> {
    Url::parse_with_params(AVIVATOR_URL, &[("image_url", image_url.as_str())]).map_err(Error::wrap)
}

/// Neuroglancer link whose state opens every OME-Zarr layer from `zarr_url`.
///
/// Each source is the full-resolution array of a layer group, addressed
/// relative to `zarr_url`; dimensions come from the first layer's scale.
pub fn neuroglancer_url(layers: &[Layer], zarr_url: &Url) -> Result<Url> {
    let Some(first) = layers.first() else {
        return Err(Error::general("no layers to show"));
    };
    let mut dimensions = Map::new();
    for (axis, micrometers) in ["z", "y", "x"].iter().zip(first.scale) {
        dimensions.insert(axis.to_string(), json!([micrometers * 1e-6, "m"]));
    }

    let mut ng_layers = Vec::with_capacity(layers.len());
    for layer in layers {
        let LayerSource::OmeZarr { group } = &layer.source else {
            return Err(Error::general(format!(
                "layer {} is not stored in OME-Zarr",
                layer.name
            )));
        };
        let source = served_url(zarr_url, &child_path(group, FULL_RESOLUTION_PATH))?;
        let kind = match layer.kind {
            LayerKind::Image => "image",
            LayerKind::Labels => "segmentation",
        };
        ng_layers.push(json!({
            "type": kind,
            "source": format!("zarr3://{source}"),
            "name": layer.name,
        }));
    }

    let state = json!({
        "dimensions": Value::Object(dimensions),
        "layers": ng_layers,
        "layout": "4panel",
    });
    let mut url = Url::parse(NEUROGLANCER_URL).map_err(Error::wrap)?;
    url.set_fragment(Some(&format!("!{}", serde_json::to_string(&state)?)));
    Ok(url)
}

#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Directory exposed under [DATA_ROUTE].
    pub root: PathBuf,
    pub host: String,
    pub port: u16,
    /// The server shuts down after this long, or on Ctrl-C.
    pub duration: Duration,
}

/// Static file routes with permissive CORS, so browser viewers on other
/// origins can fetch the data.
pub fn router(root: &Path) -> Router {
    Router::new()
        .nest_service(DATA_ROUTE, ServeDir::new(root))
        .layer(CorsLayer::permissive())
}

async fn shutdown_signal(duration: Duration) {
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                log::warn!("could not listen for Ctrl-C: {e}");
                tokio::time::sleep(duration).await;
            } else {
                log::info!("interrupted by user");
            }
        }
        _ = tokio::time::sleep(duration) => {
            log::info!("serving window of {}s elapsed", duration.as_secs());
        }
    }
}

/// Serve `options.root` until interrupted or the serving window elapses.
pub async fn serve(options: ServeOptions) -> Result<()> {
    if !options.root.is_dir() {
        return Err(Error::NotADirectory(options.root));
    }
    let listener = tokio::net::TcpListener::bind((options.host.as_str(), options.port)).await?;
    log::info!(
        "serving {} at http://{}{DATA_ROUTE}/",
        options.root.display(),
        listener.local_addr()?
    );
    axum::serve(listener, router(&options.root))
        .with_graceful_shutdown(shutdown_signal(options.duration))
        .await?;
    log::info!("server has been shut down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    use super::*;

    #[test]
    fn avivator_link() {
        let base = data_base_url("localhost", 8005).unwrap();
        let file = served_url(&base, "example_output.ome.tiff").unwrap();
        assert_eq!(
            file.as_str(),
            "http://localhost:8005/data/example_output.ome.tiff"
        );
        let link = avivator_url(&file).unwrap();
        assert_eq!(
            link.as_str(),
            "https://avivator.gehlenborglab.org/?image_url=http%3A%2F%2Flocalhost%3A8005%2Fdata%2Fexample_output.ome.tiff"
        );
    }

    #[test]
    fn served_paths_are_encoded() {
        let base = data_base_url("localhost", 8005).unwrap();
        let url = served_url(&base, "out.zarr/images/Concanavalin A").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8005/data/out.zarr/images/Concanavalin%20A"
        );
    }

    #[test]
    fn neuroglancer_state() {
        let layers = vec![
            Layer {
                name: "Concanavalin A".into(),
                kind: LayerKind::Image,
                scale: [1.0, 0.1006, 0.1006],
                shape: [3, 4, 5],
                source: LayerSource::OmeZarr {
                    group: "/images/Concanavalin A".into(),
                },
            },
            Layer {
                name: "nuclei (labels)".into(),
                kind: LayerKind::Labels,
                scale: [1.0, 0.1006, 0.1006],
                shape: [3, 4, 5],
                source: LayerSource::OmeZarr {
                    group: "/labels/nuclei (labels)".into(),
                },
            },
        ];
        let zarr = served_url(&data_base_url("localhost", 8005).unwrap(), "out.zarr").unwrap();
        let url = neuroglancer_url(&layers, &zarr).unwrap();
        assert!(url.as_str().starts_with(NEUROGLANCER_URL));

        // quotes and spaces are escaped in the fragment; '%' is left alone
        let fragment = url.fragment().unwrap();
        assert!(fragment.starts_with("!%7B") || fragment.starts_with("!{"));
        assert!(fragment.contains(
            "%22source%22:%22zarr3://http://localhost:8005/data/out.zarr/images/Concanavalin%20A/0%22"
        ));
        assert!(fragment.contains("%22type%22:%22segmentation%22"));
        assert!(fragment.contains("%22name%22:%22nuclei%20(labels)%22"));
        assert!(fragment.contains("out.zarr/labels/nuclei%20(labels)/0%22"));
        assert!(fragment.contains("%22layout%22:%224panel%22"));
    }

    #[test]
    fn neuroglancer_needs_zarr_layers() {
        let layers = vec![Layer {
            name: "a".into(),
            kind: LayerKind::Image,
            scale: [1.0, 1.0, 1.0],
            shape: [1, 1, 1],
            source: LayerSource::OmeTiff { channel: 0 },
        }];
        let base = data_base_url("localhost", 8005).unwrap();
        assert!(neuroglancer_url(&layers, &base).is_err());
        assert!(neuroglancer_url(&[], &base).is_err());
    }

    #[tokio::test]
    async fn serves_files_with_cors() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("hello.txt"), "hi").unwrap();

        let response = router(tmp.path())
            .oneshot(
                Request::builder()
                    .uri("/data/hello.txt")
                    .header("origin", "https://avivator.gehlenborglab.org")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"hi");
    }
}
