use std::ffi::{c_char, c_void};

/// Channel layout of the pixel buffer handed to the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Rgb,
    Rgba,
}

impl PixelLayout {
    fn channels(&self) -> u32 {
        match self {
            PixelLayout::Rgb => 3,
            PixelLayout::Rgba => 4,
        }
    }
}

/// Metadata chunks muxed into the extended (VP8X) container
#[derive(Debug, Clone, Copy, Default)]
pub struct WebPMetadata<'a> {
    pub icc_profile: Option<&'a [u8]>,
    pub exif: Option<&'a [u8]>,
}

impl WebPMetadata<'_> {
    fn is_empty(&self) -> bool {
        self.icc_profile.is_none() && self.exif.is_none()
    }
}

/// High-level wrapper around libwebp-sys for encoding WebP images with
/// ICC profile and EXIF support
pub struct WebPEncoder {
    width: u32,
    height: u32,
    layout: PixelLayout,
    pixels: Vec<u8>,
}

#[derive(Debug)]
pub enum WebPError {
    EncodingFailed,
    InvalidDimensions,
    InvalidData,
    MuxError,
}

impl std::fmt::Display for WebPError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebPError::EncodingFailed => write!(f, "WebP encoding failed"),
            WebPError::InvalidDimensions => write!(f, "Invalid image dimensions"),
            WebPError::InvalidData => write!(f, "Invalid image data"),
            WebPError::MuxError => write!(f, "WebP mux error"),
        }
    }
}

impl std::error::Error for WebPError {}

impl WebPEncoder {
    pub fn new(
        width: u32,
        height: u32,
        layout: PixelLayout,
        pixels: Vec<u8>,
    ) -> Result<Self, WebPError> {
        if width == 0 || height == 0 || width > i32::MAX as u32 || height > i32::MAX as u32 {
            return Err(WebPError::InvalidDimensions);
        }

        let expected_size = width as usize * height as usize * layout.channels() as usize;
        if pixels.len() != expected_size {
            return Err(WebPError::InvalidData);
        }

        Ok(WebPEncoder {
            width,
            height,
            layout,
            pixels,
        })
    }

    /// Encode lossy at `quality` (0-100), then mux in any metadata chunks
    pub fn encode(&self, quality: f32, metadata: &WebPMetadata) -> Result<Vec<u8>, WebPError> {
        unsafe {
            let mut config =
                libwebp_sys::WebPConfig::new().map_err(|_| WebPError::EncodingFailed)?;

            config.quality = quality;
            config.method = 6; // Best compression method

            if libwebp_sys::WebPValidateConfig(&config) == 0 {
                return Err(WebPError::EncodingFailed);
            }

            let mut picture =
                libwebp_sys::WebPPicture::new().map_err(|_| WebPError::EncodingFailed)?;

            picture.width = self.width as i32;
            picture.height = self.height as i32;
            picture.use_argb = 0; // Use YUV(A) format

            let stride = (self.width * self.layout.channels()) as i32;
            let imported = match self.layout {
                PixelLayout::Rgb => {
                    libwebp_sys::WebPPictureImportRGB(&mut picture, self.pixels.as_ptr(), stride)
                }
                PixelLayout::Rgba => {
                    libwebp_sys::WebPPictureImportRGBA(&mut picture, self.pixels.as_ptr(), stride)
                }
            };
            if imported == 0 {
                libwebp_sys::WebPPictureFree(&mut picture);
                return Err(WebPError::EncodingFailed);
            }

            let mut memory_writer = WebPMemoryWriter::new();
            picture.writer = Some(webp_memory_write);
            picture.custom_ptr = &mut memory_writer as *mut _ as *mut c_void;

            let encode_result = libwebp_sys::WebPEncode(&config, &mut picture);

            libwebp_sys::WebPPictureFree(&mut picture);

            if encode_result == 0 {
                return Err(WebPError::EncodingFailed);
            }

            let webp_data = memory_writer.into_data();
            if metadata.is_empty() {
                return Ok(webp_data);
            }

            mux_metadata(&webp_data, metadata)
        }
    }
}

/// Rebuild the container with ICCP/EXIF chunks using WebPMux
unsafe fn mux_metadata(webp_data: &[u8], metadata: &WebPMetadata) -> Result<Vec<u8>, WebPError> {
    unsafe {
        let input_data = libwebp_sys::WebPData {
            bytes: webp_data.as_ptr(),
            size: webp_data.len(),
        };

        let mux = libwebp_sys::WebPMuxNew();
        if mux.is_null() {
            return Err(WebPError::MuxError);
        }

        if libwebp_sys::WebPMuxSetImage(mux, &input_data, 1) != libwebp_sys::WebPMuxError::WEBP_MUX_OK
        {
            libwebp_sys::WebPMuxDelete(mux);
            return Err(WebPError::MuxError);
        }

        let chunks = [
            (b"ICCP\0", metadata.icc_profile),
            (b"EXIF\0", metadata.exif),
        ];
        for (fourcc, payload) in chunks {
            let Some(payload) = payload else {
                continue;
            };
            let chunk = libwebp_sys::WebPData {
                bytes: payload.as_ptr(),
                size: payload.len(),
            };
            let set_result =
                libwebp_sys::WebPMuxSetChunk(mux, fourcc.as_ptr().cast::<c_char>(), &chunk, 1);
            if set_result != libwebp_sys::WebPMuxError::WEBP_MUX_OK {
                libwebp_sys::WebPMuxDelete(mux);
                return Err(WebPError::MuxError);
            }
        }

        let mut assembled_data = libwebp_sys::WebPData {
            bytes: std::ptr::null(),
            size: 0,
        };

        if libwebp_sys::WebPMuxAssemble(mux, &mut assembled_data)
            != libwebp_sys::WebPMuxError::WEBP_MUX_OK
        {
            libwebp_sys::WebPMuxDelete(mux);
            return Err(WebPError::MuxError);
        }

        let final_data = if assembled_data.size > 0 && !assembled_data.bytes.is_null() {
            std::slice::from_raw_parts(assembled_data.bytes, assembled_data.size).to_vec()
        } else {
            libwebp_sys::WebPMuxDelete(mux);
            return Err(WebPError::MuxError);
        };

        libwebp_sys::WebPDataClear(&mut assembled_data);
        libwebp_sys::WebPMuxDelete(mux);

        Ok(final_data)
    }
}

/// Custom memory writer for capturing WebP output
struct WebPMemoryWriter {
    data: Vec<u8>,
}

impl WebPMemoryWriter {
    fn new() -> Self {
        Self { data: Vec::new() }
    }

    fn write(&mut self, data: &[u8]) -> bool {
        self.data.extend_from_slice(data);
        true
    }

    fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// C callback function for writing WebP data to memory
unsafe extern "C" fn webp_memory_write(
    data: *const u8,
    data_size: usize,
    picture: *const libwebp_sys::WebPPicture,
) -> i32 {
    unsafe {
        if data.is_null() || picture.is_null() {
            return 0;
        }

        let writer = (*picture).custom_ptr as *mut WebPMemoryWriter;
        if writer.is_null() {
            return 0;
        }

        let slice = std::slice::from_raw_parts(data, data_size);
        if (*writer).write(slice) { 1 } else { 0 }
    }
}

/// Walk the RIFF chunk list of an encoded WebP file
pub fn chunk_fourccs(webp_data: &[u8]) -> Vec<[u8; 4]> {
    let mut fourccs = Vec::new();
    if webp_data.len() < 12 || &webp_data[0..4] != b"RIFF" || &webp_data[8..12] != b"WEBP" {
        return fourccs;
    }

    let mut pos = 12;
    while pos + 8 <= webp_data.len() {
        let mut fourcc = [0u8; 4];
        fourcc.copy_from_slice(&webp_data[pos..pos + 4]);
        let chunk_size = u32::from_le_bytes([
            webp_data[pos + 4],
            webp_data[pos + 5],
            webp_data[pos + 6],
            webp_data[pos + 7],
        ]) as usize;
        fourccs.push(fourcc);
        pos += 8 + chunk_size + (chunk_size % 2);
    }
    fourccs
}
