#[cfg(test)]
mod session_tests {
    use std::future::Future;
    use std::task::Poll;

    use img_compressor_rs::compression::QualityFactor;
    use img_compressor_rs::config::Config;
    use img_compressor_rs::errors::CompressorError;
    use img_compressor_rs::session::{CompressionOutcome, CompressorSession};
    use mime::Mime;

    fn create_test_png(width: u32, height: u32) -> Vec<u8> {
        let mut img = image::ImageBuffer::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            let r = ((x * 7 + y * 13) % 256) as u8;
            let g = (x % 256) as u8;
            let b = (y % 256) as u8;
            *pixel = image::Rgb([r, g, b]);
        }
        let mut buffer = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut buffer),
            image::ImageOutputFormat::Png,
        )
        .expect("Failed to encode test PNG");
        buffer
    }

    fn create_test_jpeg(width: u32, height: u32) -> Vec<u8> {
        let mut img = image::ImageBuffer::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8]);
        }
        let mut buffer = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut buffer),
            image::ImageOutputFormat::Jpeg(90),
        )
        .expect("Failed to encode test JPEG");
        buffer
    }

    fn png_mime() -> Mime {
        "image/png".parse().unwrap()
    }

    fn jpeg_mime() -> Mime {
        "image/jpeg".parse().unwrap()
    }

    fn session() -> CompressorSession {
        CompressorSession::new(Config::default())
    }

    #[tokio::test]
    async fn compress_without_source_fails() {
        let session = session();
        assert!(matches!(
            session.compress(None).await,
            Err(CompressorError::NoSource)
        ));
    }

    #[tokio::test]
    async fn compress_commits_result_and_metrics() {
        let session = session();
        let data = create_test_png(100, 100);
        let original_len = data.len() as u64;
        session.select_source(data, png_mime(), "photo.png");

        let outcome = session.compress(None).await.expect("compression");
        let metrics = match outcome {
            CompressionOutcome::Completed(m) => m,
            CompressionOutcome::Superseded => panic!("nothing superseded this request"),
        };

        assert_eq!(metrics.original_bytes, original_len);
        let result = session.current_result().expect("result committed");
        assert_eq!(metrics.compressed_bytes, result.byte_len() as u64);
        assert_eq!((result.width, result.height), (100, 100));
        assert_eq!(session.metrics(), Some(metrics));
    }

    #[tokio::test]
    async fn stale_request_is_discarded_when_source_changes_mid_flight() {
        let session = session();
        session.select_source(create_test_png(200, 200), png_mime(), "a.png");

        // Drive the request past its source snapshot, but not to completion.
        let compress_a = session.compress(Some(QualityFactor::new(50).unwrap()));
        tokio::pin!(compress_a);
        let first_poll_pending = std::future::poll_fn(|cx| {
            Poll::Ready(compress_a.as_mut().poll(cx).is_pending())
        })
        .await;
        assert!(first_poll_pending, "compression should still be in flight");

        // Replace the source while A is in flight.
        session.select_source(create_test_jpeg(40, 30), jpeg_mime(), "b.jpg");

        let outcome_a = compress_a.await.expect("superseded is not an error");
        assert_eq!(outcome_a, CompressionOutcome::Superseded);
        assert!(
            session.current_result().is_none(),
            "stale result must never attach to the new source"
        );

        // The new source compresses normally and its result is the one shown.
        let outcome_b = session
            .compress(Some(QualityFactor::new(80).unwrap()))
            .await
            .expect("compression of b");
        assert!(matches!(outcome_b, CompressionOutcome::Completed(_)));

        let result = session.current_result().expect("b's result");
        assert_eq!(result.mime_type, jpeg_mime());
        assert_eq!((result.width, result.height), (40, 30));
        assert_eq!(session.download_filename().as_deref(), Some("compressed_b.jpg"));
    }

    #[tokio::test]
    async fn selecting_new_source_discards_previous_result() {
        let session = session();
        session.select_source(create_test_png(50, 50), png_mime(), "first.png");
        session.compress(None).await.expect("compression");
        assert!(session.current_result().is_some());

        session.select_source(create_test_jpeg(50, 50), jpeg_mime(), "second.jpg");
        assert!(session.current_result().is_none());
        assert!(session.metrics().is_none());
        assert!(session.download_filename().is_none());
    }

    #[tokio::test]
    async fn recompression_replaces_previous_result() {
        let session = session();
        session.select_source(create_test_jpeg(80, 80), jpeg_mime(), "photo.jpg");

        let first = session
            .compress(Some(QualityFactor::new(90).unwrap()))
            .await
            .expect("first compression");
        assert!(matches!(first, CompressionOutcome::Completed(_)));

        let second = session
            .compress(Some(QualityFactor::new(20).unwrap()))
            .await
            .expect("second compression");
        let metrics = match second {
            CompressionOutcome::Completed(m) => m,
            CompressionOutcome::Superseded => panic!("same source, nothing superseded"),
        };

        let result = session.current_result().expect("second result");
        assert_eq!(metrics.compressed_bytes, result.byte_len() as u64);
    }

    #[tokio::test]
    async fn decode_failure_leaves_no_stale_result() {
        let session = session();
        session.select_source(vec![0u8; 512], png_mime(), "corrupt.png");

        let err = session.compress(None).await.unwrap_err();
        assert!(matches!(err, CompressorError::Decode(_)), "got {:?}", err);
        assert!(session.current_result().is_none());
        assert!(session.metrics().is_none());
    }

    #[tokio::test]
    async fn download_filename_prefixes_original_name() {
        let session = session();
        session.select_source(create_test_png(30, 30), png_mime(), "vacation photo.png");
        assert!(session.download_filename().is_none(), "no result yet");

        session.compress(None).await.expect("compression");
        assert_eq!(
            session.download_filename().as_deref(),
            Some("compressed_vacation photo.png")
        );
    }

    #[tokio::test]
    async fn clear_releases_source_and_result() {
        let session = session();
        session.select_source(create_test_png(30, 30), png_mime(), "photo.png");
        session.compress(None).await.expect("compression");

        session.clear();
        assert!(session.current_source().is_none());
        assert!(session.current_result().is_none());
        assert!(matches!(
            session.compress(None).await,
            Err(CompressorError::NoSource)
        ));
    }
}
