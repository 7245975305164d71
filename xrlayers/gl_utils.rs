/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use euclid::Rect;
use euclid::Size2D;

use log::warn;

use sparkle::gl;
use sparkle::gl::GLuint;
use sparkle::gl::Gl;

use std::rc::Rc;

use xrlayers_api::Color;
use xrlayers_api::Graphics;
use xrlayers_api::Viewport;

/// `Graphics` on top of a current GL context.
pub struct GlGraphics {
    gl: Rc<Gl>,
}

impl GlGraphics {
    pub fn new(gl: Rc<Gl>) -> GlGraphics {
        GlGraphics { gl }
    }

    fn bound_framebuffers(&self) -> [i32; 2] {
        let mut bound_fbos = [0, 0];
        unsafe {
            self.gl
                .get_integer_v(gl::DRAW_FRAMEBUFFER_BINDING, &mut bound_fbos[0..]);
            self.gl
                .get_integer_v(gl::READ_FRAMEBUFFER_BINDING, &mut bound_fbos[1..]);
        }
        bound_fbos
    }

    fn restore_framebuffers(&self, bound_fbos: [i32; 2]) {
        self.gl
            .bind_framebuffer(gl::DRAW_FRAMEBUFFER, bound_fbos[0] as GLuint);
        self.gl
            .bind_framebuffer(gl::READ_FRAMEBUFFER, bound_fbos[1] as GLuint);
    }
}

impl Graphics for GlGraphics {
    fn create_framebuffer(&self, texture: u32, size: Size2D<i32, Viewport>) -> Option<u32> {
        let gl = &self.gl;
        let bound_fbos = self.bound_framebuffers();

        let fbo = gl.gen_framebuffers(1)[0];
        gl.bind_framebuffer(gl::FRAMEBUFFER, fbo);
        gl.framebuffer_texture_2d(
            gl::FRAMEBUFFER,
            gl::COLOR_ATTACHMENT0,
            gl::TEXTURE_2D,
            texture,
            0,
        );
        let status = gl.check_framebuffer_status(gl::FRAMEBUFFER);

        self.restore_framebuffers(bound_fbos);

        if status != gl::FRAMEBUFFER_COMPLETE {
            warn!(
                "Framebuffer for texture {} ({}x{}) incomplete: 0x{:x}",
                texture, size.width, size.height, status
            );
            gl.delete_framebuffers(&[fbo]);
            return None;
        }
        debug_assert_eq!(gl.get_error(), gl::NO_ERROR);
        Some(fbo)
    }

    fn bind_framebuffer(&self, target: u32, framebuffer: u32) {
        self.gl.bind_framebuffer(target, framebuffer);
    }

    fn clear_framebuffer(&self, framebuffer: u32, color: Color) {
        let gl = &self.gl;
        let bound_fbos = self.bound_framebuffers();
        let mut clear_color = [0., 0., 0., 0.];
        let scissor_enabled = gl.is_enabled(gl::SCISSOR_TEST);
        unsafe {
            gl.get_float_v(gl::COLOR_CLEAR_VALUE, &mut clear_color[..]);
        }

        gl.bind_framebuffer(gl::FRAMEBUFFER, framebuffer);
        gl.disable(gl::SCISSOR_TEST);
        gl.clear_color(color.r, color.g, color.b, color.a);
        gl.clear(gl::COLOR_BUFFER_BIT);

        self.restore_framebuffers(bound_fbos);
        gl.clear_color(
            clear_color[0],
            clear_color[1],
            clear_color[2],
            clear_color[3],
        );
        if scissor_enabled {
            gl.enable(gl::SCISSOR_TEST);
        }
        debug_assert_eq!(gl.get_error(), gl::NO_ERROR);
    }

    fn delete_framebuffer(&self, framebuffer: u32) {
        self.gl.delete_framebuffers(&[framebuffer]);
    }

    fn viewport(&self, rect: Rect<i32, Viewport>) {
        self.gl.viewport(
            rect.origin.x,
            rect.origin.y,
            rect.size.width,
            rect.size.height,
        );
    }

    fn clear(&self, color: Color) {
        self.gl.clear_color(color.r, color.g, color.b, color.a);
        self.gl.clear(gl::COLOR_BUFFER_BIT | gl::DEPTH_BUFFER_BIT);
    }
}
