//! Vega demo - animated clear-and-present loop on the Vulkan backend.
//!
//! Opens a window and drives the surface swapchain through the full
//! per-frame contract: acquire, wait on the readiness signal, clear the
//! color image, present. Window resizes exercise the rebuild path. When no
//! display is available the demo falls back to a headless ring and captures
//! one frame to prove the offscreen path.

use ash::vk;
use ash::vk::Handle;
use std::sync::Arc;

use vega_present::vega::present::{Extent, SwapchainFlags};
use vega_present::vega_info;
use vega_present_vulkan::{Config, VulkanCommands, VulkanContext, VulkanStagePool, VulkanSwapchain};

use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::{Window, WindowId};

const SOURCE: &str = "vega::demo";

#[derive(Default)]
struct App {
    window: Option<Arc<Window>>,
    commands: Option<Arc<VulkanCommands>>,
    swapchain: Option<VulkanSwapchain>,
    frame_count: u64,
}

impl App {
    fn draw(&mut self) {
        let (Some(vs), Some(commands)) = (self.swapchain.as_mut(), self.commands.as_ref()) else {
            return;
        };

        let frame = match vs.swapchain.acquire() {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("acquire failed: {}", e);
                return;
            }
        };
        if frame.resized {
            let extent = vs.swapchain.extent();
            vega_info!(SOURCE, "swap resources now {}x{}", extent.width, extent.height);
        }

        let signal = vs.swapchain.take_ready_signal().expect("image was acquired");
        let image = vk::Image::from_raw(
            vs.swapchain
                .current_color()
                .expect("image was acquired")
                .resource()
                .native_handle(),
        );

        // Slow color sweep so motion is visible.
        let t = self.frame_count as f32 * 0.02;
        let clear_color = vk::ClearColorValue {
            float32: [t.sin() * 0.5 + 0.5, t.cos() * 0.5 + 0.5, 0.35, 1.0],
        };

        // The image arrives in the color-attachment layout; clearing goes
        // through transfer-dst and back so present sees the layout the
        // swapchain tracks.
        let result = commands.record_with(|device, command_buffer| unsafe {
            let range = vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            };
            let to_transfer = vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(range)
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE);
            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_transfer],
            );

            device.cmd_clear_color_image(
                command_buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &clear_color,
                &[range],
            );

            let back_to_attachment = vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(range)
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(
                    vk::AccessFlags::COLOR_ATTACHMENT_READ
                        | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                );
            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[back_to_attachment],
            );
        });
        if let Err(e) = result {
            log::error!("recording failed: {}", e);
            return;
        }

        // The whole batch (layout transitions included) waits for the image
        // to actually be ready.
        let wait = if signal.raw() != 0 {
            vec![(
                vk::Semaphore::from_raw(signal.raw()),
                vk::PipelineStageFlags::TOP_OF_PIPE,
            )]
        } else {
            Vec::new()
        };
        if let Err(e) = commands.submit(&wait, &[]) {
            log::error!("submit failed: {}", e);
            return;
        }

        vs.swapchain.mark_first_render_pass();
        if let Err(e) = vs.swapchain.present() {
            log::error!("present failed: {}", e);
            return;
        }
        self.frame_count += 1;
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.swapchain.is_some() {
            return;
        }

        let window = Arc::new(
            event_loop
                .create_window(
                    Window::default_attributes()
                        .with_title("Vega Demo")
                        .with_inner_size(winit::dpi::LogicalSize::new(800, 600)),
                )
                .expect("failed to create window"),
        );

        let context = VulkanContext::new(Some(window.as_ref()), &Config::default())
            .expect("failed to create Vulkan context");
        let commands = VulkanCommands::new(Arc::clone(&context)).expect("failed to create commands");
        let stage_pool = VulkanStagePool::new(Arc::clone(&context));

        let swapchain = VulkanSwapchain::new(
            context,
            Arc::clone(&commands),
            stage_pool,
            Some(window.as_ref()),
            SwapchainFlags::empty(),
            Extent::ZERO,
        )
        .expect("failed to create swapchain");

        let extent = swapchain.swapchain.extent();
        vega_info!(
            SOURCE,
            "presenting {}x{} with {} images",
            extent.width,
            extent.height,
            swapchain.swapchain.image_count()
        );

        self.window = Some(window);
        self.commands = Some(commands);
        self.swapchain = Some(swapchain);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                // Swapchain teardown drains outstanding GPU work.
                self.swapchain = None;
                event_loop.exit();
            }
            WindowEvent::Resized(_) => {
                // The rebuild happens lazily on the next acquire.
            }
            WindowEvent::RedrawRequested => {
                self.draw();
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

/// Offscreen fallback: one headless frame captured to memory.
fn run_headless() {
    let context = VulkanContext::new::<Window>(None, &Config::default())
        .expect("failed to create Vulkan context");
    let commands = VulkanCommands::new(Arc::clone(&context)).expect("failed to create commands");
    let stage_pool = VulkanStagePool::new(Arc::clone(&context));

    let mut vs = VulkanSwapchain::new::<Window>(
        context,
        commands,
        stage_pool,
        None,
        SwapchainFlags::empty(),
        Extent::new(640, 480),
    )
    .expect("failed to create headless swapchain");

    vs.swapchain.acquire().expect("acquire failed");
    let pixels = vs.read_pixels().expect("readback failed");
    vs.swapchain.present().expect("present failed");
    vega_info!(
        SOURCE,
        "captured one headless frame: {} bytes",
        pixels.len()
    );
}

fn main() {
    env_logger::init();

    match EventLoop::new() {
        Ok(event_loop) => {
            let mut app = App::default();
            event_loop.run_app(&mut app).expect("event loop failed");
        }
        Err(e) => {
            log::warn!("no display available ({}), running headless", e);
            run_headless();
        }
    }
}
