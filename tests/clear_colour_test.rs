#[cfg(feature = "integration-tests")]
mod common;

#[test]
#[cfg(feature = "integration-tests")]
fn should_render_clear_colour() {
    use crate::common::test_utils::{FrameCounter, TestRender};
    use flow_playground::{context::Context, flow::ImageTestResult};
    use wgpu::Color;

    golden_image_test!(TestRender::new(
        |ctx: &mut Context| {
            ctx.clear_colour = Color::WHITE;
        },
        Box::new(|_, state: &mut FrameCounter, texture| {
            if state.frame() == 0 {
                return Ok(ImageTestResult::Waiting);
            }
            let desired_pixel = image::Rgba([255, 255, 255, 255]);
            for pixel in texture.pixels() {
                assert_eq!(*pixel, desired_pixel);
            }
            Ok(ImageTestResult::Passed)
        }),
    ));
}
