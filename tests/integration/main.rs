mod flows;
mod mock_backend;
