use std::{convert::TryFrom, time::Instant};

use anyhow::{Result, anyhow};
use nokhwa::{Buffer, utils::FrameFormat};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

use crate::types::Frame;

/// Converts a captured buffer into an RGBA [`Frame`] stamped with `timestamp`.
pub fn convert_camera_frame(buffer: &Buffer, timestamp: Instant) -> Result<Frame> {
    let resolution = buffer.resolution();
    let (width, height) = (resolution.width_x, resolution.height_y);
    let rgba = convert_pixels(buffer.source_frame_format(), buffer.buffer(), width, height)?;

    let frame = Frame {
        rgba,
        width,
        height,
        timestamp,
    };
    if !frame.is_valid() {
        return Err(anyhow!(
            "decoded {}x{} frame has {} bytes",
            width,
            height,
            frame.rgba.len()
        ));
    }
    Ok(frame)
}

fn convert_pixels(format: FrameFormat, data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    match format {
        FrameFormat::NV12 => nv12_to_rgba(data, width, height),
        FrameFormat::YUYV => yuyv_to_rgba(data, width, height),
        FrameFormat::MJPEG => mjpeg_to_rgba(data, width, height),
        FrameFormat::RAWRGB => rgb_like_to_rgba(data, width, height, false),
        FrameFormat::RAWBGR => rgb_like_to_rgba(data, width, height, true),
        FrameFormat::GRAY => gray_to_rgba(data, width, height),
    }
}

fn ensure_len(kind: &str, data: &[u8], expected_len: usize) -> Result<()> {
    if data.len() < expected_len {
        return Err(anyhow!(
            "{kind} buffer too small: got {}, expected {expected_len}",
            data.len()
        ));
    }
    Ok(())
}

fn nv12_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let y_plane_len = width as usize * height as usize;
    let uv_plane_len = y_plane_len / 2;
    ensure_len("NV12", data, y_plane_len + uv_plane_len)?;

    let mut rgba = vec![0u8; y_plane_len * 4];
    let image = YuvBiPlanarImage {
        y_plane: &data[..y_plane_len],
        y_stride: width,
        uv_plane: &data[y_plane_len..y_plane_len + uv_plane_len],
        uv_stride: width,
        width,
        height,
    };

    yuv_nv12_to_rgba(
        &image,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12 to RGBA failed: {err:?}"))?;

    Ok(rgba)
}

fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    ensure_len("YUYV", data, width as usize * height as usize * 2)?;

    let mut rgba = vec![0u8; (width as usize * height as usize) * 4];
    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };

    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV422 to RGBA failed: {err:?}"))?;

    Ok(rgba)
}

fn mjpeg_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;

    if let Some(info) = decoder.info() {
        let expected_len = usize::try_from(info.width)
            .and_then(|w| usize::try_from(info.height).map(|h| w * h * 4))
            .map_err(|_| anyhow!("MJPEG dimensions do not fit usize"))?;
        ensure_len("MJPEG", &rgba, expected_len)?;
        let reported = width as usize * height as usize * 4;
        if expected_len != reported {
            return Err(anyhow!(
                "MJPEG frame size differs from the {width}x{height} camera resolution"
            ));
        }
    }

    Ok(rgba)
}

fn rgb_like_to_rgba(data: &[u8], width: u32, height: u32, swap_rb: bool) -> Result<Vec<u8>> {
    ensure_len("RGB", data, width as usize * height as usize * 3)?;

    let mut rgba = vec![0u8; (width as usize * height as usize) * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_chunks_exact(3))
        .for_each(|(dst, src)| {
            if swap_rb {
                dst[0] = src[2];
                dst[1] = src[1];
                dst[2] = src[0];
            } else {
                dst[..3].copy_from_slice(src);
            }
            dst[3] = 255;
        });

    Ok(rgba)
}

fn gray_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected_len = width as usize * height as usize;
    ensure_len("GRAY", data, expected_len)?;

    let mut rgba = vec![0u8; expected_len * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_iter().copied())
        .for_each(|(dst, value)| {
            dst[..3].fill(value);
            dst[3] = 255;
        });

    Ok(rgba)
}
