pub mod shared {
    pub mod constants;
    pub mod frame;
    pub mod video_metadata;
}

pub mod video {
    pub mod domain {
        pub mod frame_sink;
        pub mod frame_source;
        pub mod video_error;
    }
    pub mod infrastructure;
}

pub mod preview {
    pub mod domain {
        pub mod preview_sink;
    }
    pub mod infrastructure;
}

pub mod detection {
    pub mod domain {
        pub mod face_landmarks;
        pub mod face_locator;
        pub mod face_region;
    }
    pub mod infrastructure;
}

pub mod compositing {
    pub mod domain {
        pub mod face_compositor;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod pipeline_controller;
    pub mod pipeline_logger;
    pub mod pipeline_state;
    pub mod run_summary;
    pub mod skip_reason;
    pub mod swap_config;
    pub mod swap_faces_use_case;

    #[cfg(test)]
    pub(crate) mod test_support;
}
