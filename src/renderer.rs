//! glow renderer for the three mesh slots: one lit, alpha-blended program
//! and a VAO/VBO pair per slot, painted from inside egui's frame via a
//! paint callback.

use crate::mesh::TriangleMesh;
use glam::Mat4;
use glow::{Context, HasContext as _};

/// Per-slot draw parameters captured for one frame's paint callback.
#[derive(Clone, Copy)]
pub struct SlotDraw {
    pub visible: bool,
    pub model: Mat4,
    pub color: [f32; 4],
}

#[derive(Clone, Copy)]
pub struct FrameParams {
    pub view_proj: Mat4,
    pub draws: [SlotDraw; 3],
}

struct SlotBuffer {
    vao: glow::VertexArray,
    vbo: glow::Buffer,
    vertex_count: i32,
}

pub struct SceneRenderer {
    program: glow::Program,
    u_mvp: glow::UniformLocation,
    u_model: glow::UniformLocation,
    u_color: glow::UniformLocation,
    slots: [SlotBuffer; 3],
}

unsafe impl Send for SceneRenderer {}
unsafe impl Sync for SceneRenderer {}

const VERTEX_SHADER: &str = r#"#version 300 es
    precision highp float;
    uniform mat4 u_mvp;
    uniform mat4 u_model;
    layout(location = 0) in vec3 a_pos;
    layout(location = 1) in vec3 a_normal;
    out vec3 v_normal;
    void main() {
        v_normal = mat3(u_model) * a_normal;
        gl_Position = u_mvp * vec4(a_pos, 1.0);
    }"#;

const FRAGMENT_SHADER: &str = r#"#version 300 es
    precision mediump float;
    uniform vec4 u_color;
    in vec3 v_normal;
    out vec4 o_col;
    void main() {
        vec3 n = normalize(v_normal);
        if (!gl_FrontFacing) { n = -n; }
        vec3 key = normalize(vec3(1.0, 1.0, 1.0));
        vec3 fill = normalize(vec3(-1.0, -1.0, 1.0));
        float light = 0.6 + 0.8 * max(dot(n, key), 0.0) + 0.4 * max(dot(n, fill), 0.0);
        o_col = vec4(u_color.rgb * min(light, 1.25), u_color.a);
    }"#;

impl SceneRenderer {
    pub fn new(gl: &Context) -> Result<Self, String> {
        unsafe {
            let program = gl.create_program()?;
            let vs = compile_shader(gl, glow::VERTEX_SHADER, VERTEX_SHADER)?;
            let fs = compile_shader(gl, glow::FRAGMENT_SHADER, FRAGMENT_SHADER)?;
            gl.attach_shader(program, vs);
            gl.attach_shader(program, fs);
            gl.link_program(program);
            gl.delete_shader(vs);
            gl.delete_shader(fs);
            if !gl.get_program_link_status(program) {
                return Err(format!("program link: {}", gl.get_program_info_log(program)));
            }

            let u_mvp = locate(gl, program, "u_mvp")?;
            let u_model = locate(gl, program, "u_model")?;
            let u_color = locate(gl, program, "u_color")?;

            let mut slots = Vec::with_capacity(3);
            for _ in 0..3 {
                let vao = gl.create_vertex_array()?;
                let vbo = gl.create_buffer()?;
                gl.bind_vertex_array(Some(vao));
                gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
                gl.enable_vertex_attrib_array(0);
                gl.vertex_attrib_pointer_f32(0, 3, glow::FLOAT, false, 24, 0);
                gl.enable_vertex_attrib_array(1);
                gl.vertex_attrib_pointer_f32(1, 3, glow::FLOAT, false, 24, 12);
                slots.push(SlotBuffer { vao, vbo, vertex_count: 0 });
            }
            gl.bind_vertex_array(None);

            let slots: [SlotBuffer; 3] = slots
                .try_into()
                .map_err(|_| "slot buffer construction".to_string())?;
            Ok(Self { program, u_mvp, u_model, u_color, slots })
        }
    }

    /// Replace one slot's vertex buffer with freshly parsed geometry.
    pub fn upload_slot(&mut self, gl: &Context, index: usize, mesh: &TriangleMesh) {
        let floats = mesh.interleaved();
        let slot = &mut self.slots[index];
        unsafe {
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(slot.vbo));
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(&floats),
                glow::STATIC_DRAW,
            );
        }
        // 6 floats per vertex: xyz + normal.
        slot.vertex_count = (floats.len() / 6) as i32;
    }

    pub fn paint(&self, gl: &Context, frame: &FrameParams) {
        unsafe {
            gl.clear(glow::DEPTH_BUFFER_BIT);
            gl.enable(glow::DEPTH_TEST);
            gl.depth_func(glow::LESS);
            gl.enable(glow::BLEND);
            gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
            gl.use_program(Some(self.program));

            for (slot, draw) in self.slots.iter().zip(&frame.draws) {
                if !draw.visible || slot.vertex_count == 0 {
                    continue;
                }
                let mvp = frame.view_proj * draw.model;
                gl.uniform_matrix_4_f32_slice(Some(&self.u_mvp), false, &mvp.to_cols_array());
                gl.uniform_matrix_4_f32_slice(
                    Some(&self.u_model),
                    false,
                    &draw.model.to_cols_array(),
                );
                gl.uniform_4_f32(
                    Some(&self.u_color),
                    draw.color[0],
                    draw.color[1],
                    draw.color[2],
                    draw.color[3],
                );
                gl.bind_vertex_array(Some(slot.vao));
                gl.draw_arrays(glow::TRIANGLES, 0, slot.vertex_count);
            }

            gl.bind_vertex_array(None);
            gl.disable(glow::DEPTH_TEST);
        }
    }

    /// Release GPU resources. The renderer must not be used afterwards.
    pub fn destroy(&self, gl: &Context) {
        unsafe {
            gl.delete_program(self.program);
            for slot in &self.slots {
                gl.delete_vertex_array(slot.vao);
                gl.delete_buffer(slot.vbo);
            }
        }
    }
}

fn compile_shader(gl: &Context, kind: u32, source: &str) -> Result<glow::Shader, String> {
    unsafe {
        let shader = gl.create_shader(kind)?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            return Err(format!("shader compile: {}", gl.get_shader_info_log(shader)));
        }
        Ok(shader)
    }
}

fn locate(gl: &Context, program: glow::Program, name: &str) -> Result<glow::UniformLocation, String> {
    unsafe {
        gl.get_uniform_location(program, name)
            .ok_or_else(|| format!("missing uniform {name}"))
    }
}
