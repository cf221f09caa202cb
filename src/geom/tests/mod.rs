mod test_pipeline_basic;
mod test_triangulation_basic;
